use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pressup_core::CoreUpdateOffer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::layout::InstallLayout;

pub const UPDATE_CORE_OPTION: &str = "update_core";
pub const AUTO_CORE_UPDATE_FAILED_OPTION: &str = "auto_core_update_failed";

/// Named JSON documents under the state directory, one file per option.
#[derive(Debug, Clone)]
pub struct OptionStore {
    dir: PathBuf,
}

impl OptionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_layout(layout: &InstallLayout) -> Self {
        Self::new(layout.options_dir())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read option file: {}", path.display()));
            }
        };
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing option file: {}", path.display()))?;
        Ok(Some(value))
    }

    pub fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path(name);
        let encoded = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to encode option '{name}'"))?;
        fs::write(&path, encoded)
            .with_context(|| format!("failed to write option file: {}", path.display()))
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to delete option file: {}", path.display()))
            }
        }
    }
}

/// Cached result of the last version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCoreCache {
    pub last_checked: u64,
    pub version_checked: String,
    pub updates: Vec<CoreUpdateOffer>,
}
