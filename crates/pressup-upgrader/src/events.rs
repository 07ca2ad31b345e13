use pressup_core::UpgradeError;
use tracing::{info, warn};

/// Progress notifications emitted while an upgrade runs. The defaults log
/// through `tracing`; front ends override what they render.
pub trait UpgradeEvents {
    fn feedback(&self, message: &str) {
        info!("{message}");
    }

    fn error(&self, error: &UpgradeError) {
        warn!(code = error.code(), "{}", error.display_messages());
    }

    fn core_updated(&self, version: &str) {
        info!(version, "core updated");
    }

    fn process_complete(&self, action: &str, kind: &str) {
        info!(action, kind, "upgrade process complete");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl UpgradeEvents for TracingEvents {}
