use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use pressup_core::{codes, CoreUpdateOffer, PackageVariant, UpgradeManifests};
use pressup_upgrader::{
    cached_updates, changed_files, detect_method, installed_version, maintenance, run_auto_update,
    unix_now, AutoUpdateOutcome, ChecksumSource, CoreUpgrader, FileLockStore, Filesystem,
    HttpChecksumService, HttpStatsReporter, InstallLayout, LockManager, MaintenanceStatus,
    NoStats, OptionStore, ReqwestClient, ServerEnvironment, StatsReporter, TransportOptions,
    TransportRegistry, UpgradeArgs, UpgradeSettings, VersionCheckClient, CORE_UPDATER_LOCK,
};

use crate::config::PressupConfig;
use crate::render::{print_lines, print_status, render_status_line, CliEvents, OutputStyle};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub offer_path: Option<PathBuf>,
    pub attempt_rollback: bool,
    pub reinstall: bool,
    pub pre_check_checksums: bool,
}

/// Everything a command needs, resolved once from the configuration.
struct Runtime {
    layout: InstallLayout,
    filesystem: Box<dyn Filesystem>,
    options: OptionStore,
    locks: LockManager,
}

impl Runtime {
    fn open(config: &PressupConfig) -> Result<Self> {
        let layout = config.layout();
        let method = config
            .method
            .clone()
            .unwrap_or_else(|| detect_method(&layout, &config.fallback_method));
        let transport_options = TransportOptions {
            root: layout.root().to_path_buf(),
            ..TransportOptions::default()
        };
        let filesystem = TransportRegistry::default()
            .connect(&method, &transport_options, &layout, &[])
            .map_err(anyhow::Error::new)
            .with_context(|| format!("failed connecting '{method}' transport"))?;
        layout.ensure_state_dirs()?;

        Ok(Self {
            options: OptionStore::for_layout(&layout),
            locks: LockManager::new(Arc::new(FileLockStore::new(layout.locks_dir()))),
            filesystem,
            layout,
        })
    }

    fn installed_version(&self) -> Result<String> {
        Ok(installed_version(self.filesystem.as_ref(), &self.layout)
            .map_err(anyhow::Error::new)?
            .version)
    }
}

/// Borrowed collaborators for one [`CoreUpgrader`] run.
struct EngineParts {
    http: ReqwestClient,
    environment: ServerEnvironment,
    manifests: UpgradeManifests,
    settings: UpgradeSettings,
}

impl EngineParts {
    fn new(config: &PressupConfig) -> Result<Self> {
        Ok(Self {
            http: ReqwestClient::new(Duration::from_secs(config.http_timeout_secs))?,
            environment: config.environment(),
            manifests: config.manifests()?,
            settings: config.settings(),
        })
    }
}

fn with_core_upgrader<T>(
    config: &PressupConfig,
    runtime: &Runtime,
    parts: &EngineParts,
    events: &CliEvents,
    run: impl FnOnce(&CoreUpgrader<'_>) -> T,
) -> T {
    let checksums = HttpChecksumService::new(&parts.http, &config.api_url);
    let http_stats = HttpStatsReporter::new(&parts.http, &config.api_url);
    let stats: &dyn StatsReporter = if config.report_stats {
        &http_stats
    } else {
        &NoStats
    };
    let upgrader = CoreUpgrader {
        filesystem: runtime.filesystem.as_ref(),
        layout: &runtime.layout,
        http: &parts.http,
        checksums: &checksums,
        locks: &runtime.locks,
        options: &runtime.options,
        stats,
        events,
        environment: &parts.environment,
        manifests: &parts.manifests,
        settings: &parts.settings,
    };
    run(&upgrader)
}

pub fn run_check_command(config: &PressupConfig, style: OutputStyle) -> Result<()> {
    let runtime = Runtime::open(config)?;
    let http = ReqwestClient::new(Duration::from_secs(config.http_timeout_secs))?;
    let current = runtime.installed_version()?;

    let client = VersionCheckClient::new(&http, &config.api_url);
    let cache = client.refresh(&runtime.options, &current, &config.locale, unix_now()?)?;
    print_lines(&format_offer_lines(&current, &cache.updates, style));
    Ok(())
}

pub fn run_upgrade_command(
    config: &PressupConfig,
    style: OutputStyle,
    options: UpgradeOptions,
) -> Result<()> {
    let runtime = Runtime::open(config)?;
    let parts = EngineParts::new(config)?;
    let current = runtime.installed_version()?;

    let mut offer = match &options.offer_path {
        Some(path) => read_offer_file(path)?,
        None => resolve_offer(config, &runtime, &parts.http, &current)?,
    };
    if options.reinstall {
        offer.response = "reinstall".to_string();
    }
    if offer.is_latest() {
        print_status(style, "ok", &format!("ClassicPress {current} is the latest version"));
        return Ok(());
    }

    let args = UpgradeArgs {
        pre_check_checksums: options.pre_check_checksums,
        attempt_rollback: options.attempt_rollback,
        do_rollback: false,
    };
    let events = CliEvents::new(style);
    let result = with_core_upgrader(config, &runtime, &parts, &events, |upgrader| {
        upgrader.upgrade(&offer, args)
    });
    events.finish();

    match result {
        Ok(version) => {
            print_status(style, "ok", &format!("ClassicPress {current} -> {version}"));
            Ok(())
        }
        Err(err) if err.code() == codes::UP_TO_DATE => {
            print_status(style, "ok", &format!("ClassicPress {current} is the latest version"));
            Ok(())
        }
        Err(err) => Err(anyhow!("core upgrade failed ({})", err.code())),
    }
}

pub fn run_auto_update_command(config: &PressupConfig, style: OutputStyle) -> Result<()> {
    let runtime = Runtime::open(config)?;
    let mut parts = EngineParts::new(config)?;
    parts.settings.background = true;
    let current = runtime.installed_version()?;
    let offer = resolve_offer(config, &runtime, &parts.http, &current)?;
    let policy = config.auto_update_policy();

    let events = CliEvents::new(style);
    let outcome = with_core_upgrader(config, &runtime, &parts, &events, |upgrader| {
        run_auto_update(upgrader, policy, &offer)
    })?;
    events.finish();

    match outcome {
        AutoUpdateOutcome::Skipped { current, offered } => {
            print_status(
                style,
                "warn",
                &format!("automatic update from {current} to {offered} is not allowed"),
            );
            Ok(())
        }
        AutoUpdateOutcome::Updated(version) => {
            print_status(style, "ok", &format!("ClassicPress {current} -> {version}"));
            Ok(())
        }
        AutoUpdateOutcome::Failed(err) => {
            Err(anyhow!("automatic core update failed ({})", err.code()))
        }
    }
}

pub fn run_verify_command(config: &PressupConfig, style: OutputStyle) -> Result<()> {
    let runtime = Runtime::open(config)?;
    let http = ReqwestClient::new(Duration::from_secs(config.http_timeout_secs))?;
    let current = runtime.installed_version()?;

    let service = HttpChecksumService::new(&http, &config.api_url);
    let Some(set) = service.fetch(&current, &config.locale) else {
        return Err(anyhow!(
            "no checksums published for ClassicPress {current} ({})",
            config.locale
        ));
    };
    let changed = changed_files(runtime.filesystem.as_ref(), &runtime.layout, &set);
    print_lines(&format_verify_lines(&current, &changed, style));
    if changed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} core files differ from the release", changed.len()))
    }
}

pub fn run_maintenance_command(
    config: &PressupConfig,
    style: OutputStyle,
    clear: bool,
) -> Result<()> {
    let runtime = Runtime::open(config)?;
    let now = unix_now()?;
    let status = maintenance::status(runtime.filesystem.as_ref(), &runtime.layout, now);

    if !clear {
        print_status(style, status_kind(status), &format_maintenance_line(status, now));
        return Ok(());
    }
    if status == MaintenanceStatus::Inactive {
        print_status(style, "ok", "maintenance mode is not enabled");
        return Ok(());
    }
    if !maintenance::disable(runtime.filesystem.as_ref(), &runtime.layout) {
        return Err(anyhow!(
            "failed removing maintenance flag: {}",
            runtime.layout.maintenance_path().display()
        ));
    }
    print_status(style, "ok", "maintenance mode cleared");
    Ok(())
}

pub fn run_unlock_command(config: &PressupConfig, style: OutputStyle) -> Result<()> {
    let runtime = Runtime::open(config)?;
    match runtime.locks.holder_since(CORE_UPDATER_LOCK)? {
        None => print_status(style, "ok", "core updater lock is not held"),
        Some(since) => {
            runtime.locks.release(CORE_UPDATER_LOCK)?;
            print_status(
                style,
                "warn",
                &format!("released core updater lock held since {since}"),
            );
        }
    }
    Ok(())
}

fn read_offer_file(path: &Path) -> Result<CoreUpdateOffer> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading offer: {}", path.display()))?;
    CoreUpdateOffer::from_version_check_json(&content)
        .with_context(|| format!("invalid offer: {}", path.display()))
}

/// Cached offers are reused while they were fetched for the running
/// version; otherwise the update service is asked again.
fn resolve_offer(
    config: &PressupConfig,
    runtime: &Runtime,
    http: &ReqwestClient,
    current: &str,
) -> Result<CoreUpdateOffer> {
    let cached = cached_updates(&runtime.options)?
        .filter(|cache| cache.version_checked == current && !cache.updates.is_empty());
    let updates = match cached {
        Some(cache) => cache.updates,
        None => {
            VersionCheckClient::new(http, &config.api_url)
                .refresh(&runtime.options, current, &config.locale, unix_now()?)?
                .updates
        }
    };
    select_offer(updates).ok_or_else(|| anyhow!("update service returned no offers"))
}

/// First actionable offer, or the first offer when all report `latest`.
pub fn select_offer(updates: Vec<CoreUpdateOffer>) -> Option<CoreUpdateOffer> {
    let actionable = updates.iter().position(|offer| !offer.is_latest());
    let index = actionable.unwrap_or(0);
    updates.into_iter().nth(index)
}

const VARIANTS: [PackageVariant; 5] = [
    PackageVariant::Full,
    PackageVariant::Partial,
    PackageVariant::NoContent,
    PackageVariant::NewBundled,
    PackageVariant::Rollback,
];

pub fn format_offer_lines(
    current: &str,
    updates: &[CoreUpdateOffer],
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![format!("installed: {current}")];
    if updates.is_empty() {
        lines.push(render_status_line(style, "warn", "no offers"));
        return lines;
    }
    for offer in updates {
        let variants = VARIANTS
            .iter()
            .filter(|variant| offer.packages.get(**variant).is_some())
            .map(|variant| variant.as_str())
            .collect::<Vec<_>>();
        let status = if offer.is_latest() { "ok" } else { "info" };
        let response = if offer.response.trim().is_empty() {
            "latest"
        } else {
            offer.response.trim()
        };
        let message = if variants.is_empty() {
            format!("{response} {}", offer.version)
        } else {
            format!("{response} {} [{}]", offer.version, variants.join(", "))
        };
        lines.push(render_status_line(style, status, &message));
    }
    lines
}

pub fn format_verify_lines(version: &str, changed: &[String], style: OutputStyle) -> Vec<String> {
    if changed.is_empty() {
        return vec![render_status_line(
            style,
            "ok",
            &format!("all core files match ClassicPress {version}"),
        )];
    }
    changed
        .iter()
        .map(|path| render_status_line(style, "err", &format!("changed: {path}")))
        .collect()
}

fn status_kind(status: MaintenanceStatus) -> &'static str {
    match status {
        MaintenanceStatus::Inactive => "ok",
        MaintenanceStatus::Active { .. } => "info",
        MaintenanceStatus::Stale { .. } => "warn",
    }
}

pub fn format_maintenance_line(status: MaintenanceStatus, now: u64) -> String {
    match status {
        MaintenanceStatus::Inactive => "maintenance mode is not enabled".to_string(),
        MaintenanceStatus::Active { since } => format!(
            "maintenance mode enabled {}s ago",
            now.saturating_sub(since)
        ),
        MaintenanceStatus::Stale { since } => format!(
            "stale maintenance flag from {}s ago is ignored; run `pressup maintenance clear`",
            now.saturating_sub(since)
        ),
    }
}
