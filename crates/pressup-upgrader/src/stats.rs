use pressup_core::{ErrorData, UpgradeError};
use serde::Serialize;
use tracing::debug;

use crate::download::HttpClient;

/// Outcome of one non-rollback upgrade run as sent to the update service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeStats {
    pub update_type: String,
    pub success: bool,
    pub fs_method: String,
    pub time_taken: u64,
    pub reported: String,
    pub attempted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ErrorData>,
    pub rollback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<ErrorData>,
}

impl UpgradeStats {
    pub fn new(
        update_type: impl Into<String>,
        fs_method: impl Into<String>,
        reported: impl Into<String>,
        attempted: impl Into<String>,
    ) -> Self {
        Self {
            update_type: update_type.into(),
            success: true,
            fs_method: fs_method.into(),
            time_taken: 0,
            reported: reported.into(),
            attempted: attempted.into(),
            error_code: None,
            error_data: None,
            rollback: false,
            rollback_code: None,
            rollback_data: None,
        }
    }

    /// Records a failure. A `rollback_was_required` error reports the
    /// original failure as the error and the rollback run's failure, if any,
    /// separately.
    pub fn record_error(&mut self, error: &UpgradeError) {
        self.success = false;
        match error.rollback_data() {
            Some(rollback) => {
                self.error_code = Some(rollback.update.code().to_string());
                self.error_data = rollback.update.data().cloned();
                self.rollback = true;
                if let Err(rollback_error) = &rollback.rollback {
                    self.rollback_code = Some(rollback_error.code().to_string());
                    self.rollback_data = rollback_error.data().cloned();
                }
            }
            None => {
                self.error_code = Some(error.code().to_string());
                self.error_data = error.data().cloned();
            }
        }
    }

    /// Flat `key=value` pairs; structured data is JSON encoded.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("update_type".to_string(), self.update_type.clone()),
            ("success".to_string(), flag(self.success)),
            ("fs_method".to_string(), self.fs_method.clone()),
            ("time_taken".to_string(), self.time_taken.to_string()),
            ("reported".to_string(), self.reported.clone()),
            ("attempted".to_string(), self.attempted.clone()),
            ("rollback".to_string(), flag(self.rollback)),
        ];
        let optional = [
            ("error_code", self.error_code.clone()),
            ("error_data", self.error_data.as_ref().map(encode)),
            ("rollback_code", self.rollback_code.clone()),
            ("rollback_data", self.rollback_data.as_ref().map(encode)),
        ];
        form.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key.to_string(), value))),
        );
        form
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn encode(data: &ErrorData) -> String {
    match data {
        ErrorData::Text(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub trait StatsReporter {
    fn report(&self, stats: &UpgradeStats);
}

/// Discards stats; used when reporting is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStats;

impl StatsReporter for NoStats {
    fn report(&self, stats: &UpgradeStats) {
        debug!(success = stats.success, "stats reporting disabled");
    }
}

/// Posts stats to the version-check endpoint. Delivery failures are only
/// logged.
pub struct HttpStatsReporter<'a> {
    http: &'a dyn HttpClient,
    endpoint: String,
}

impl<'a> HttpStatsReporter<'a> {
    pub fn new(http: &'a dyn HttpClient, api_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/core/version-check/1.7/", api_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl StatsReporter for HttpStatsReporter<'_> {
    fn report(&self, stats: &UpgradeStats) {
        match self.http.post_form(&self.endpoint, &stats.to_form()) {
            Ok(response) if response.is_success() => {
                debug!(endpoint = %self.endpoint, "upgrade stats reported");
            }
            Ok(response) => {
                debug!(endpoint = %self.endpoint, status = response.status, "stats endpoint rejected report");
            }
            Err(err) => {
                debug!(endpoint = %self.endpoint, error = %format!("{err:#}"), "failed to report upgrade stats");
            }
        }
    }
}
