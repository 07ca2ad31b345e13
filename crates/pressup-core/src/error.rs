use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes;

/// Outcome of one upgrade attempt: the installed version string or a
/// structured failure.
pub type UpgradeResult = Result<String, UpgradeError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorData {
    Text(String),
    Paths(Vec<String>),
    DiskSpace {
        uncompressed_size: u64,
        available_space: u64,
    },
    Rollback(Box<RollbackData>),
}

impl ErrorData {
    pub fn path(path: &Path) -> Self {
        Self::Text(path.display().to_string())
    }
}

/// Payload of a `rollback_was_required` error: the failure that triggered the
/// rollback and whatever the rollback run itself produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackData {
    pub update: UpgradeError,
    pub rollback: UpgradeResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Transport,
    Staging,
    Validation,
    PreCopy,
    CopyFatal,
    BestEffort,
    Wrapping,
}

impl ErrorKind {
    pub fn classify(code: &str) -> Self {
        match code {
            codes::UP_TO_DATE | codes::LOCKED => Self::Precondition,
            codes::INSANE_DISTRO
            | codes::PHP_NOT_COMPATIBLE
            | codes::MYSQL_NOT_COMPATIBLE
            | codes::PHP_MYSQL_NOT_COMPATIBLE
            | codes::PHP_NOT_COMPATIBLE_JSON => Self::Validation,
            codes::FILES_NOT_WRITABLE => Self::PreCopy,
            codes::ROLLBACK_WAS_REQUIRED => Self::Wrapping,
            codes::COPY_FAILED_FOR_VERSION_FILE
            | codes::COPY_FAILED_FOR_UPDATE_CORE_FILE
            | codes::DISK_FULL => Self::CopyFatal,
            _ if code.starts_with(codes::COPY_FAILED_FOR_NEW_BUNDLED_PREFIX)
                || code.ends_with(codes::LANGUAGES_SUFFIX)
                || code.ends_with("_plugins")
                || code.ends_with("_themes") =>
            {
                Self::BestEffort
            }
            _ if code.contains("__copy_dir") => Self::CopyFatal,
            _ if code.starts_with("fs_") => Self::Transport,
            _ => Self::Staging,
        }
    }
}

/// A structured failure: a primary `(code, message, data)` triple plus any
/// further entries accumulated during best-effort phases.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct UpgradeError {
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<ErrorData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    additional: Vec<ErrorEntry>,
}

impl UpgradeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
            additional: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: ErrorData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_path(self, path: &Path) -> Self {
        self.with_data(ErrorData::path(path))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&ErrorData> {
        self.data.as_ref()
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::classify(&self.code)
    }

    /// All entries, primary first.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        let mut entries = Vec::with_capacity(self.additional.len() + 1);
        entries.push(ErrorEntry {
            code: self.code.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
        });
        entries.extend(self.additional.iter().cloned());
        entries
    }

    pub fn codes(&self) -> Vec<&str> {
        std::iter::once(self.code.as_str())
            .chain(self.additional.iter().map(|entry| entry.code.as_str()))
            .collect()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.codes().contains(&code)
    }

    pub fn push(&mut self, entry: ErrorEntry) {
        self.additional.push(entry);
    }

    pub fn merge(&mut self, other: UpgradeError) {
        self.additional.extend(other.entries());
    }

    /// Folds `error` into an optional accumulator, keeping the first error
    /// as the primary entry.
    pub fn accumulate(slot: &mut Option<UpgradeError>, error: UpgradeError) {
        match slot {
            Some(existing) => existing.merge(error),
            None => *slot = Some(error),
        }
    }

    pub fn with_code_suffix(mut self, suffix: &str) -> Self {
        self.code.push_str(suffix);
        self
    }

    /// Rewrites a path-valued payload so it is relative to `prefix`, the way
    /// operators see paths relative to the installation root.
    pub fn relative_to(mut self, prefix: &Path) -> Self {
        if let Some(ErrorData::Text(value)) = &self.data {
            let path = Path::new(value);
            if let Ok(stripped) = path.strip_prefix(prefix) {
                self.data = Some(ErrorData::Text(stripped.display().to_string()));
            }
        }
        self
    }

    /// Messages of every entry joined for display; codes stay available
    /// through [`UpgradeError::entries`].
    pub fn display_messages(&self) -> String {
        std::iter::once(self.message.as_str())
            .chain(self.additional.iter().map(|entry| entry.message.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether a failure leaves the tree damaged enough that an automatic
    /// reinstall of the previous release should be attempted.
    pub fn is_rollback_eligible(&self) -> bool {
        self.code.contains("do_rollback")
            || self.code.contains("__copy_dir")
            || self.code == codes::DISK_FULL
    }

    pub fn rollback_data(&self) -> Option<&RollbackData> {
        match &self.data {
            Some(ErrorData::Rollback(data)) => Some(data),
            _ => None,
        }
    }
}
