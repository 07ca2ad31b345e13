use tracing::{debug, warn};

use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_FILE};
use crate::layout::InstallLayout;

/// Sentinels older than this are ignored by readers; a request killed
/// mid-copy would otherwise keep the site down indefinitely.
pub const MAINTENANCE_STALE_AFTER_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceFlag {
    pub started_at: u64,
}

impl MaintenanceFlag {
    pub fn render(&self) -> String {
        format!("<?php $upgrading = {}; ?>", self.started_at)
    }

    /// Parses `<?php $upgrading = <ts>; ?>`. A sentinel without a readable
    /// timestamp is treated as just written.
    pub fn parse(contents: &str, now: u64) -> Self {
        let started_at = contents
            .split_once("$upgrading")
            .and_then(|(_, rest)| rest.trim_start().strip_prefix('='))
            .and_then(|rest| {
                let digits = rest.trim_start();
                let end = digits
                    .find(|ch: char| !ch.is_ascii_digit())
                    .unwrap_or(digits.len());
                digits[..end].parse::<u64>().ok()
            })
            .unwrap_or(now);
        Self { started_at }
    }

    pub fn is_active(&self, now: u64) -> bool {
        now.saturating_sub(self.started_at) < MAINTENANCE_STALE_AFTER_SECS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStatus {
    Inactive,
    Active { since: u64 },
    Stale { since: u64 },
}

/// Writes a fresh sentinel, replacing any existing one.
pub fn enable(filesystem: &dyn Filesystem, layout: &InstallLayout, now: u64) -> bool {
    let path = layout.maintenance_path();
    debug!(path = %path.display(), started_at = now, "writing maintenance sentinel");
    filesystem.delete(&path, false, Some(EntryType::File));
    let written = filesystem.put_contents(
        &path,
        MaintenanceFlag { started_at: now }.render().as_bytes(),
        FS_CHMOD_FILE,
    );
    if !written {
        warn!(path = %path.display(), "failed to write maintenance sentinel");
    }
    written
}

pub fn disable(filesystem: &dyn Filesystem, layout: &InstallLayout) -> bool {
    let path = layout.maintenance_path();
    if !filesystem.exists(&path) {
        return true;
    }
    filesystem.delete(&path, false, Some(EntryType::File))
}

pub fn read(filesystem: &dyn Filesystem, layout: &InstallLayout, now: u64) -> Option<MaintenanceFlag> {
    let contents = filesystem.get_contents(&layout.maintenance_path())?;
    Some(MaintenanceFlag::parse(&String::from_utf8_lossy(&contents), now))
}

pub fn status(filesystem: &dyn Filesystem, layout: &InstallLayout, now: u64) -> MaintenanceStatus {
    match read(filesystem, layout, now) {
        None => MaintenanceStatus::Inactive,
        Some(flag) if flag.is_active(now) => MaintenanceStatus::Active {
            since: flag.started_at,
        },
        Some(flag) => MaintenanceStatus::Stale {
            since: flag.started_at,
        },
    }
}
