use anyhow::Result;
use pressup_core::version::{self, branch, is_development_build};
use pressup_core::{codes, CoreUpdateOffer, ErrorData, UpgradeError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core_upgrader::{CoreUpgrader, UpgradeArgs};
use crate::distro::installed_version;
use crate::lock::unix_now;
use crate::state::{OptionStore, AUTO_CORE_UPDATE_FAILED_OPTION};

/// Failures worth retrying on the next scheduled run without operator
/// attention.
pub const TRANSIENT_FAILURES: &[&str] = &[
    codes::INCOMPATIBLE_ARCHIVE,
    codes::DOWNLOAD_FAILED,
    codes::INSANE_DISTRO,
    codes::LOCKED,
];

/// Site-wide switch, as set in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdateSetting {
    Disabled,
    Minor,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoUpdatePolicy {
    pub development: bool,
    pub minor: bool,
    pub major: bool,
}

impl Default for AutoUpdatePolicy {
    fn default() -> Self {
        Self {
            development: true,
            minor: true,
            major: false,
        }
    }
}

impl AutoUpdatePolicy {
    pub fn from_setting(setting: Option<AutoUpdateSetting>) -> Self {
        match setting {
            None => Self::default(),
            Some(AutoUpdateSetting::Disabled) => Self {
                development: false,
                minor: false,
                major: false,
            },
            Some(AutoUpdateSetting::Minor) => Self {
                development: false,
                minor: true,
                major: false,
            },
            Some(AutoUpdateSetting::All) => Self {
                development: true,
                minor: true,
                major: true,
            },
        }
    }
}

/// Persisted after an unattended upgrade fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub attempted: String,
    pub current: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ErrorData>,
    pub timestamp: u64,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<ErrorData>,
}

impl FailureRecord {
    /// Critical failures (a damaged tree, or a rollback that failed too)
    /// block further unattended upgrades until an operator clears them.
    pub fn from_error(attempted: &str, current: &str, error: &UpgradeError, now: u64) -> Self {
        let code = error.code();
        let mut record = Self {
            attempted: attempted.to_string(),
            current: current.to_string(),
            error_code: code.to_string(),
            error_data: error.data().cloned(),
            timestamp: now,
            critical: false,
            retry: false,
            rollback_code: None,
            rollback_data: None,
        };

        if code == codes::DISK_FULL || code.contains("__copy_dir") {
            record.critical = true;
        } else if let Some(Err(rollback)) = error.rollback_data().map(|data| &data.rollback) {
            record.critical = true;
            record.rollback_code = Some(rollback.code().to_string());
            record.rollback_data = rollback.data().cloned();
        }
        if !record.critical {
            record.retry = TRANSIENT_FAILURES.iter().any(|transient| *transient == code);
        }
        record
    }
}

pub fn load_failure(options: &OptionStore) -> Result<Option<FailureRecord>> {
    options.get(AUTO_CORE_UPDATE_FAILED_OPTION)
}

pub fn record_failure(options: &OptionStore, record: &FailureRecord) -> Result<()> {
    options.set(AUTO_CORE_UPDATE_FAILED_OPTION, record)
}

/// Whether an unattended run may move `current` to `offered`.
pub fn should_update_to_version(
    policy: AutoUpdatePolicy,
    current: &str,
    offered: &str,
    failure: Option<&FailureRecord>,
) -> bool {
    if !version::is_newer(offered, current) {
        return false;
    }

    if let Some(failure) = failure {
        if failure.critical {
            return false;
        }
        if failure.current == current && offered.contains(".1.next.minor") {
            return false;
        }
        if !failure.retry && failure.current == current && failure.attempted == offered {
            return false;
        }
    }

    if is_development_build(current) {
        return policy.development;
    }
    let current_branch = branch(current);
    let offered_branch = branch(offered);
    if current_branch == offered_branch {
        return policy.minor;
    }
    if version::is_newer(&offered_branch, &current_branch) {
        return policy.major;
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoUpdateOutcome {
    Skipped { current: String, offered: String },
    Updated(String),
    Failed(UpgradeError),
}

/// Unattended upgrade: policy check, upgrade with rollback enabled, and
/// bookkeeping of the failure record.
pub fn run_auto_update(
    upgrader: &CoreUpgrader<'_>,
    policy: AutoUpdatePolicy,
    offer: &CoreUpdateOffer,
) -> Result<AutoUpdateOutcome> {
    let current = installed_version(upgrader.filesystem, upgrader.layout)
        .map_err(anyhow::Error::new)?
        .version;
    let failure = load_failure(upgrader.options)?;

    if offer.is_latest()
        || !should_update_to_version(policy, &current, &offer.version, failure.as_ref())
    {
        info!(%current, offered = %offer.version, "automatic update not allowed");
        return Ok(AutoUpdateOutcome::Skipped {
            current,
            offered: offer.version.clone(),
        });
    }

    let args = UpgradeArgs {
        pre_check_checksums: true,
        attempt_rollback: true,
        do_rollback: false,
    };
    match upgrader.upgrade(offer, args) {
        Ok(installed) => Ok(AutoUpdateOutcome::Updated(installed)),
        Err(err) => {
            let record = FailureRecord::from_error(&offer.version, &current, &err, unix_now()?);
            if record.critical {
                warn!(code = %record.error_code, "critical automatic update failure recorded");
            }
            record_failure(upgrader.options, &record)?;
            Ok(AutoUpdateOutcome::Failed(err))
        }
    }
}
