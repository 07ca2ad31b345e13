//! Swaps a staged release into the live tree.
//!
//! The copy runs in a fixed order: gates and writability checks first, then
//! maintenance mode, the bulk copy, the version file, verification with one
//! retry, locale files, maintenance off, and finally the best-effort extras.
//! The version file is the last core file written, so a half-copied tree
//! still reports the previous release.

use std::path::{Path, PathBuf};

use pressup_core::messages::{self, interpolate};
use pressup_core::version::{self, server_satisfies};
use pressup_core::{codes, BundledKind, ErrorData, UpgradeError, UpgradeManifests, UpgradeResult};
use tracing::{debug, info, warn};

use crate::checksums::{plan_copy, verify_copy, ChecksumSource};
use crate::distro::staged_version;
use crate::events::UpgradeEvents;
use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_DIR, FS_CHMOD_FILE};
use crate::layout::{InstallLayout, DEFAULT_CONTENT_DIR, VERSION_FILE};
use crate::lock::unix_now;
use crate::maintenance;
use crate::stager::{copy_dir, core_copy_dir};
use crate::state::{OptionStore, AUTO_CORE_UPDATE_FAILED_OPTION};

/// What the hosting stack reports about itself; compared against the
/// requirements in the staged version file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEnvironment {
    pub php_version: String,
    pub mysql_version: String,
    pub php_extensions: Vec<String>,
    /// `false` when a `db.php` drop-in talks to something other than MySQL.
    pub is_mysql: bool,
}

impl ServerEnvironment {
    pub fn new(php_version: impl Into<String>, mysql_version: impl Into<String>) -> Self {
        Self {
            php_version: php_version.into(),
            mysql_version: mysql_version.into(),
            php_extensions: vec!["json".to_string()],
            is_mysql: true,
        }
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.php_extensions
            .iter()
            .any(|loaded| loaded.eq_ignore_ascii_case(name))
    }
}

pub struct UpdateCore<'a> {
    pub filesystem: &'a dyn Filesystem,
    pub layout: &'a InstallLayout,
    pub events: &'a dyn UpgradeEvents,
    pub checksums: &'a dyn ChecksumSource,
    pub environment: &'a ServerEnvironment,
    pub manifests: &'a UpgradeManifests,
    pub options: &'a OptionStore,
    pub locale: &'a str,
    pub skip_new_bundled: bool,
}

impl UpdateCore<'_> {
    /// Installs the release under `distro_root` over the running
    /// `previous_version`. The working directory is removed on every exit
    /// except a failure of just one of the PHP and database gates.
    pub fn apply(
        &self,
        working_dir: &Path,
        distro_root: &Path,
        previous_version: &str,
    ) -> UpgradeResult {
        let staged = match staged_version(self.filesystem, self.layout, distro_root) {
            Ok(staged) => staged,
            Err(err) => return Err(self.discard(working_dir, err)),
        };
        let target = staged.version.clone();
        let development_build = version::is_development_build(&format!("{previous_version}{target}"));

        self.check_requirements(working_dir, &staged)?;

        let checksums = self.checksums.fetch(&target, self.locale);
        let plan = plan_copy(self.filesystem, self.layout, checksums.as_ref(), distro_root);
        if let Err(err) = self.check_writable(&plan.check_is_writable) {
            return Err(self.discard(working_dir, err));
        }

        self.events.feedback(messages::MAINTENANCE_START);
        maintenance::enable(self.filesystem, self.layout, unix_now().unwrap_or_default());

        let preloaded = self.preload_vendored();
        debug!(count = preloaded.len(), "preloaded vendored files");

        self.events.feedback(messages::COPYING_FILES);
        let mut skip = plan.skip;
        let mut result = self.copy_core(distro_root, &mut skip, checksums.as_ref());
        if result.is_ok() {
            result = self.copy_languages(distro_root);
        }

        self.events.feedback(messages::MAINTENANCE_END);
        maintenance::disable(self.filesystem, self.layout);

        let mut failure = result.err();
        if failure.is_none() && !self.skip_new_bundled {
            failure = self.copy_new_bundled(distro_root, previous_version, development_build);
        }
        if let Some(err) = failure {
            return Err(self.discard(working_dir, err));
        }

        self.remove_old_files();
        self.filesystem
            .delete(working_dir, true, Some(EntryType::Dir));

        self.events
            .feedback(&interpolate(messages::CORE_UPDATED, &[target.as_str()]));
        self.events.core_updated(&target);
        if let Err(err) = self.options.delete(AUTO_CORE_UPDATE_FAILED_OPTION) {
            warn!(error = %format!("{err:#}"), "failed to clear auto-update failure record");
        }
        info!(from = previous_version, to = %target, "core files updated");
        Ok(target)
    }

    fn discard(&self, working_dir: &Path, error: UpgradeError) -> UpgradeError {
        self.filesystem
            .delete(working_dir, true, Some(EntryType::Dir));
        error
    }

    fn check_requirements(
        &self,
        working_dir: &Path,
        staged: &pressup_core::VersionManifest,
    ) -> Result<(), UpgradeError> {
        let env = self.environment;
        let required_php = staged.required_php_version.as_deref().unwrap_or_default();
        let required_mysql = staged.required_mysql_version.as_deref().unwrap_or_default();

        let php_compat = server_satisfies(&env.php_version, required_php);
        let mysql_compat = if self.filesystem.exists(&self.layout.db_dropin_path()) && !env.is_mysql {
            true
        } else {
            server_satisfies(&env.mysql_version, required_mysql)
        };

        let target = staged.version.as_str();
        if !php_compat && !mysql_compat {
            self.filesystem
                .delete(working_dir, true, Some(EntryType::Dir));
            return Err(UpgradeError::new(
                codes::PHP_MYSQL_NOT_COMPATIBLE,
                interpolate(
                    messages::PHP_MYSQL_NOT_COMPATIBLE,
                    &[
                        target,
                        required_php,
                        required_mysql,
                        env.php_version.as_str(),
                        env.mysql_version.as_str(),
                    ],
                ),
            ));
        }
        if !php_compat {
            return Err(UpgradeError::new(
                codes::PHP_NOT_COMPATIBLE,
                interpolate(
                    messages::PHP_NOT_COMPATIBLE,
                    &[target, required_php, env.php_version.as_str()],
                ),
            ));
        }
        if !mysql_compat {
            return Err(UpgradeError::new(
                codes::MYSQL_NOT_COMPATIBLE,
                interpolate(
                    messages::MYSQL_NOT_COMPATIBLE,
                    &[target, required_mysql, env.mysql_version.as_str()],
                ),
            ));
        }
        if !env.has_extension("json") {
            return Err(self.discard(
                working_dir,
                UpgradeError::new(
                    codes::PHP_NOT_COMPATIBLE_JSON,
                    interpolate(messages::PHP_NOT_COMPATIBLE_JSON, &[target, "JSON"]),
                ),
            ));
        }
        Ok(())
    }

    /// Only the direct transport can fix permissions itself; others are
    /// trusted to write whatever they can reach.
    fn check_writable(&self, candidates: &[String]) -> Result<(), UpgradeError> {
        if candidates.is_empty() || self.filesystem.method() != "direct" {
            return Ok(());
        }
        let not_writable = candidates
            .iter()
            .filter(|relative| {
                let path = self.layout.resolve(relative);
                if self.filesystem.is_writable(&path) {
                    return false;
                }
                self.filesystem.chmod(&path, FS_CHMOD_FILE, false);
                !self.filesystem.is_writable(&path)
            })
            .cloned()
            .collect::<Vec<_>>();

        if not_writable.is_empty() {
            return Ok(());
        }
        Err(
            UpgradeError::new(codes::FILES_NOT_WRITABLE, messages::FILES_NOT_WRITABLE)
                .with_data(ErrorData::Paths(not_writable)),
        )
    }

    /// Loads the previous release's vendored library files while they still
    /// exist, so code holding on to them survives their removal.
    fn preload_vendored(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.manifests
            .old_vendored_files
            .iter()
            .filter_map(|file| {
                let path = self.layout.resolve(&file.path);
                let contents = self.filesystem.get_contents(&path)?;
                if let Some(symbol) = &file.symbol {
                    debug!(symbol, path = %file.path, "preloaded vendored file");
                }
                Some((path, contents))
            })
            .collect()
    }

    fn copy_core(
        &self,
        distro_root: &Path,
        skip: &mut Vec<String>,
        checksums: Option<&pressup_core::ChecksumSet>,
    ) -> Result<(), UpgradeError> {
        let root = self.layout.root();
        core_copy_dir(self.filesystem, distro_root, root, skip)
            .map_err(|err| err.relative_to(root))?;
        self.copy_version_file(distro_root)?;

        let failed = verify_copy(self.filesystem, self.layout, checksums, distro_root, skip);
        if failed.is_empty() {
            return Ok(());
        }
        warn!(count = failed.len(), "files differ after copy");

        let total_size: u64 = failed
            .iter()
            .filter_map(|relative| self.filesystem.size(&distro_root.join(relative)))
            .sum();
        if let Some(available) = self.filesystem.available_space(root).filter(|free| *free > 0) {
            if total_size >= available {
                return Err(UpgradeError::new(codes::DISK_FULL, messages::DISK_FULL));
            }
        }

        core_copy_dir(self.filesystem, distro_root, root, skip).map_err(|err| {
            err.with_code_suffix(codes::RETRY_SUFFIX)
                .relative_to(root)
        })?;
        self.copy_version_file(distro_root)
    }

    fn copy_version_file(&self, distro_root: &Path) -> Result<(), UpgradeError> {
        let target = self.layout.version_file();
        let copied = self
            .filesystem
            .copy(&distro_root.join(VERSION_FILE), &target, true, FS_CHMOD_FILE);
        self.filesystem.chmod(&target, FS_CHMOD_FILE, false);
        if copied {
            return Ok(());
        }
        Err(
            UpgradeError::new(codes::COPY_FAILED_FOR_VERSION_FILE, messages::COPY_FAILED)
                .with_data(ErrorData::Text(VERSION_FILE.to_string())),
        )
    }

    fn copy_languages(&self, distro_root: &Path) -> Result<(), UpgradeError> {
        let staged = distro_root.join(DEFAULT_CONTENT_DIR).join("languages");
        if !self.filesystem.is_dir(&staged) {
            return Ok(());
        }

        let lang_dir = self.layout.languages_dir();
        if !self.filesystem.is_dir(&lang_dir) && lang_dir.starts_with(self.layout.root()) {
            self.filesystem.mkdir(&lang_dir, FS_CHMOD_DIR);
        }
        if !self.filesystem.is_dir(&lang_dir) {
            debug!(dir = %lang_dir.display(), "no language directory, skipping locale files");
            return Ok(());
        }
        let Some(remote_lang_dir) = self.filesystem.find_folder(&lang_dir) else {
            return Ok(());
        };

        copy_dir(self.filesystem, &staged, &remote_lang_dir, &[]).map_err(|err| {
            err.with_code_suffix(codes::LANGUAGES_SUFFIX)
                .relative_to(&remote_lang_dir)
        })
    }

    /// Installs plugins and themes introduced after `previous_version`.
    /// Items already present are left alone except on development builds.
    fn copy_new_bundled(
        &self,
        distro_root: &Path,
        previous_version: &str,
        development_build: bool,
    ) -> Option<UpgradeError> {
        let staged_content = distro_root.join(DEFAULT_CONTENT_DIR);
        let mut failure = None;

        for item in &self.manifests.new_bundled {
            if !development_build && !version::is_newer(&item.introduced, previous_version) {
                continue;
            }
            let source = staged_content.join(item.path.trim_end_matches('/'));
            if !self.filesystem.exists(&source) {
                continue;
            }
            let (kind, dest_dir) = match item.kind() {
                Some(BundledKind::Plugins) => (BundledKind::Plugins, self.layout.plugins_dir()),
                Some(BundledKind::Themes) => (BundledKind::Themes, self.layout.themes_dir()),
                None => continue,
            };
            let destination = dest_dir.join(item.name());

            if !item.is_directory() {
                if !development_build && self.filesystem.exists(&destination) {
                    continue;
                }
                if !self
                    .filesystem
                    .copy(&source, &destination, true, FS_CHMOD_FILE)
                {
                    UpgradeError::accumulate(
                        &mut failure,
                        UpgradeError::new(
                            format!("{}{}", codes::COPY_FAILED_FOR_NEW_BUNDLED_PREFIX, kind.as_str()),
                            messages::COPY_FAILED,
                        )
                        .with_path(&destination),
                    );
                }
                continue;
            }

            if !development_build && self.filesystem.is_dir(&destination) {
                continue;
            }
            self.filesystem.mkdir(&destination, FS_CHMOD_DIR);
            if let Err(err) = copy_dir(self.filesystem, &source, &destination, &[]) {
                let err = err
                    .with_code_suffix(&format!("_{}", kind.as_str()))
                    .relative_to(&dest_dir);
                UpgradeError::accumulate(&mut failure, err);
            }
        }
        failure
    }

    /// Deletes files dropped from the release. A file that cannot be deleted
    /// is emptied instead.
    fn remove_old_files(&self) {
        for relative in self.manifests.all_old_files() {
            let path = self.layout.resolve(relative);
            if !self.filesystem.exists(&path) {
                continue;
            }
            if self.filesystem.delete(&path, true, None) {
                debug!(path = relative, "removed obsolete file");
                continue;
            }
            if self.filesystem.is_file(&path) && !self.filesystem.put_contents(&path, b"", FS_CHMOD_FILE) {
                warn!(path = relative, "could not remove or truncate obsolete file");
            }
        }
    }
}
