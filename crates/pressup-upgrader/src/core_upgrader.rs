use std::path::Path;
use std::time::Instant;

use pressup_core::messages;
use pressup_core::version;
use pressup_core::{
    codes, CoreUpdateOffer, ErrorData, Package, PackageVariant, RollbackData, UpgradeError,
    UpgradeManifests, UpgradeResult,
};
use tracing::{debug, info, warn};

use crate::checksums::{check_files, ChecksumSource};
use crate::distro::{installed_version, resolve_distribution_root};
use crate::download::{HttpClient, SignaturePolicy};
use crate::events::UpgradeEvents;
use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_FILE};
use crate::layout::{InstallLayout, UPDATE_CORE_FILE};
use crate::lock::{LockManager, LockToken, CORE_UPDATER_LOCK, CORE_UPDATER_TTL};
use crate::state::{OptionStore, UPDATE_CORE_OPTION};
use crate::stats::{StatsReporter, UpgradeStats};
use crate::update_core::{ServerEnvironment, UpdateCore};
use crate::upgrader::Upgrader;

/// Per-call switches. Rollback runs are started with `do_rollback` set and
/// never start another rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeArgs {
    pub pre_check_checksums: bool,
    pub attempt_rollback: bool,
    pub do_rollback: bool,
}

impl Default for UpgradeArgs {
    fn default() -> Self {
        Self {
            pre_check_checksums: true,
            attempt_rollback: false,
            do_rollback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSettings {
    pub locale: String,
    pub skip_new_bundled: bool,
    /// Unattended runs check free space before extracting.
    pub background: bool,
    pub signatures: SignaturePolicy,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            skip_new_bundled: false,
            background: false,
            signatures: SignaturePolicy::default(),
        }
    }
}

struct Attempt<'o> {
    offer: &'o CoreUpdateOffer,
    args: UpgradeArgs,
    package: Package,
    running: String,
    started: Instant,
}

/// Drives one core upgrade from an offer to a result, holding the
/// `core_updater` lock for the whole attempt.
pub struct CoreUpgrader<'a> {
    pub filesystem: &'a dyn Filesystem,
    pub layout: &'a InstallLayout,
    pub http: &'a dyn HttpClient,
    pub checksums: &'a dyn ChecksumSource,
    pub locks: &'a LockManager,
    pub options: &'a OptionStore,
    pub stats: &'a dyn StatsReporter,
    pub events: &'a dyn UpgradeEvents,
    pub environment: &'a ServerEnvironment,
    pub manifests: &'a UpgradeManifests,
    pub settings: &'a UpgradeSettings,
}

impl CoreUpgrader<'_> {
    pub fn upgrade(&self, offer: &CoreUpdateOffer, args: UpgradeArgs) -> UpgradeResult {
        let result = self.upgrade_with(offer, args, None);
        if let Err(err) = &result {
            self.events.error(err);
        }
        result
    }

    /// Picks the package to fetch, first match wins: rollback, partial,
    /// new_bundled, no_content, full.
    pub fn select_package(
        &self,
        offer: &CoreUpdateOffer,
        args: UpgradeArgs,
        running_version: &str,
    ) -> Package {
        let packages = &offer.packages;
        let variant = if args.do_rollback && packages.rollback.is_some() {
            PackageVariant::Rollback
        } else if packages.partial.is_some()
            && !offer.is_reinstall()
            && offer.partial_version.as_deref() == Some(running_version)
            && !args.do_rollback
            && (!args.pre_check_checksums || self.running_files_intact(running_version))
        {
            PackageVariant::Partial
        } else if packages.new_bundled.is_some()
            && offer
                .new_bundled
                .as_deref()
                .is_some_and(|threshold| version::is_older(running_version, threshold))
            && !self.settings.skip_new_bundled
        {
            PackageVariant::NewBundled
        } else if packages.no_content.is_some() {
            PackageVariant::NoContent
        } else {
            PackageVariant::Full
        };

        Package {
            locator: packages.get(variant).unwrap_or_default().to_string(),
            variant,
            target_version: offer.version.clone(),
        }
    }

    fn running_files_intact(&self, running_version: &str) -> bool {
        let set = self
            .checksums
            .fetch(running_version, &self.settings.locale);
        let intact = check_files(self.filesystem, self.layout, set.as_ref());
        if !intact {
            info!(version = running_version, "installed files differ from release, partial package not usable");
        }
        intact
    }

    fn generic_upgrader(&self) -> Upgrader<'_> {
        Upgrader::new(self.filesystem, self.layout, self.http, self.events)
            .with_signatures(self.settings.signatures.clone())
            .with_background(self.settings.background)
    }

    fn upgrade_with(
        &self,
        offer: &CoreUpdateOffer,
        args: UpgradeArgs,
        held: Option<&LockToken>,
    ) -> UpgradeResult {
        let started = Instant::now();
        if offer.is_latest() {
            return Err(UpgradeError::new(codes::UP_TO_DATE, messages::UP_TO_DATE));
        }

        let upgrader = self.generic_upgrader();
        upgrader.fs_connect(&[self.layout.root().to_path_buf(), self.layout.content_dir()])?;
        let running = installed_version(self.filesystem, self.layout)?.version;
        let package = self.select_package(offer, args, &running);
        debug!(variant = %package.variant, locator = %package.locator, "selected package");

        let attempt = Attempt {
            offer,
            args,
            package,
            running,
            started,
        };
        if let Some(token) = held {
            return self.upgrade_locked(&upgrader, &attempt, token);
        }

        let token = match self.locks.acquire(CORE_UPDATER_LOCK, CORE_UPDATER_TTL) {
            Ok(Some(token)) => token,
            Ok(None) => return Err(UpgradeError::new(codes::LOCKED, messages::LOCKED)),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "lock store unavailable");
                return Err(UpgradeError::new(codes::LOCKED, messages::LOCKED)
                    .with_data(ErrorData::Text(format!("{err:#}"))));
            }
        };
        let result = self.upgrade_locked(&upgrader, &attempt, &token);
        if let Err(err) = self.locks.release_token(token) {
            warn!(error = %format!("{err:#}"), "failed to release core updater lock");
        }
        result
    }

    fn upgrade_locked(
        &self,
        upgrader: &Upgrader<'_>,
        attempt: &Attempt<'_>,
        token: &LockToken,
    ) -> UpgradeResult {
        let Attempt {
            offer,
            args,
            package,
            running,
            started,
        } = attempt;
        let args = *args;
        let mut result = self.stage_and_apply(upgrader, package, running);

        let wants_rollback = args.attempt_rollback
            && offer.packages.rollback.is_some()
            && !args.do_rollback;
        if let Err(err) = &result {
            if wants_rollback && err.is_rollback_eligible() {
                self.events.error(err);
                self.events.feedback(messages::ROLLBACK_START);
                let rollback = self.upgrade_with(
                    offer,
                    UpgradeArgs {
                        do_rollback: true,
                        ..args
                    },
                    Some(token),
                );
                let update = err.clone();
                result = Err(UpgradeError::new(
                    codes::ROLLBACK_WAS_REQUIRED,
                    messages::ROLLBACK_WAS_REQUIRED,
                )
                .with_data(ErrorData::Rollback(Box::new(RollbackData { update, rollback }))));
            }
        }

        self.events.process_complete("update", "core");
        if let Err(err) = self.options.delete(UPDATE_CORE_OPTION) {
            warn!(error = %format!("{err:#}"), "failed to clear update cache");
        }

        if !args.do_rollback {
            let mut stats = UpgradeStats::new(
                package.variant.as_str(),
                self.filesystem.method(),
                running,
                &offer.version,
            );
            stats.time_taken = started.elapsed().as_secs();
            if let Err(err) = &result {
                stats.record_error(err);
            }
            self.stats.report(&stats);
        }
        result
    }

    fn stage_and_apply(
        &self,
        upgrader: &Upgrader<'_>,
        package: &Package,
        running: &str,
    ) -> UpgradeResult {
        let download = upgrader.download_package(&package.locator)?;
        let delete_package = download != Path::new(&package.locator);
        let working_dir = upgrader.unpack_package(&download, delete_package)?;

        let distro_root = match resolve_distribution_root(self.filesystem, &working_dir) {
            Ok(root) => root,
            Err(err) => {
                self.filesystem
                    .delete(&working_dir, true, Some(EntryType::Dir));
                return Err(err);
            }
        };

        // The new release's updater file goes in first.
        let update_core_file = self.layout.update_core_file();
        if !self.filesystem.copy(
            &distro_root.join(UPDATE_CORE_FILE),
            &update_core_file,
            true,
            FS_CHMOD_FILE,
        ) {
            self.filesystem
                .delete(&working_dir, true, Some(EntryType::Dir));
            return Err(UpgradeError::new(
                codes::COPY_FAILED_FOR_UPDATE_CORE_FILE,
                messages::COPY_FAILED,
            )
            .with_data(ErrorData::Text(UPDATE_CORE_FILE.to_string())));
        }
        self.filesystem
            .chmod(&update_core_file, FS_CHMOD_FILE, false);

        UpdateCore {
            filesystem: self.filesystem,
            layout: self.layout,
            events: self.events,
            checksums: self.checksums,
            environment: self.environment,
            manifests: self.manifests,
            options: self.options,
            locale: &self.settings.locale,
            skip_new_bundled: self.settings.skip_new_bundled,
        }
        .apply(&working_dir, &distro_root, running)
    }
}
