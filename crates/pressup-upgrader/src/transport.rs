use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use pressup_core::messages::{self, interpolate};
use pressup_core::{codes, ErrorData, UpgradeError};
use tracing::{debug, warn};

use crate::direct::DirectFilesystem;
use crate::filesystem::Filesystem;
use crate::layout::InstallLayout;

#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub root: PathBuf,
    /// Transport-specific settings (host, user, key path, ...).
    pub settings: BTreeMap<String, String>,
}

pub type TransportFactory =
    Box<dyn Fn(&TransportOptions) -> Option<Box<dyn Filesystem>> + Send + Sync>;

/// Maps a transport identifier to the factory that builds it.
pub struct TransportRegistry {
    factories: BTreeMap<String, TransportFactory>,
}

impl TransportRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TransportFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(
        &self,
        method: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn Filesystem>, UpgradeError> {
        self.factories
            .get(method)
            .and_then(|factory| factory(options))
            .ok_or_else(|| {
                UpgradeError::new(codes::FS_UNAVAILABLE, messages::FS_UNAVAILABLE)
                    .with_data(ErrorData::Text(method.to_string()))
            })
    }

    /// Builds and connects a transport, then checks that the installation
    /// root, the content directory and any `extra` directories are reachable.
    pub fn connect(
        &self,
        method: &str,
        options: &TransportOptions,
        layout: &InstallLayout,
        extra: &[PathBuf],
    ) -> Result<Box<dyn Filesystem>, UpgradeError> {
        let filesystem = self.create(method, options)?;
        check_connection(filesystem.as_ref(), layout, extra)?;
        Ok(filesystem)
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "direct",
            Box::new(|_options: &TransportOptions| {
                Some(Box::new(DirectFilesystem::new()) as Box<dyn Filesystem>)
            }),
        );
        registry
    }
}

pub fn check_connection(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    extra: &[PathBuf],
) -> Result<(), UpgradeError> {
    if !filesystem.connect() {
        return Err(UpgradeError::new(codes::FS_ERROR, messages::FS_ERROR));
    }
    if !filesystem.is_dir(layout.root()) {
        return Err(UpgradeError::new(
            codes::FS_NO_ROOT_DIR,
            messages::FS_NO_ROOT_DIR,
        ));
    }
    if !filesystem.is_dir(&layout.content_dir()) {
        return Err(UpgradeError::new(
            codes::FS_NO_CONTENT_DIR,
            interpolate(messages::FS_NO_CONTENT_DIR, &[layout.content_dir_name()]),
        ));
    }
    for dir in extra {
        if filesystem.find_folder(dir).is_none() {
            let name = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(UpgradeError::new(
                codes::FS_NO_FOLDER,
                interpolate(messages::FS_NO_FOLDER, &[name.as_str()]),
            ));
        }
    }
    Ok(())
}

/// Picks `direct` when files created by this process end up owned by the
/// same user as the installation itself; otherwise returns `fallback`.
pub fn detect_method(layout: &InstallLayout, fallback: &str) -> String {
    let context = layout.content_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let marker = context.join(format!("temp-write-test-{nanos}"));

    let created = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .is_ok();
    if !created {
        debug!(dir = %context.display(), "content directory is not writable by this process");
        return fallback.to_string();
    }

    let same_owner = owners_match(&marker, &layout.version_file());
    if fs::remove_file(&marker).is_err() {
        warn!(path = %marker.display(), "failed to remove transport test file");
    }

    if same_owner {
        "direct".to_string()
    } else {
        fallback.to_string()
    }
}

#[cfg(unix)]
fn owners_match(marker: &Path, reference: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(marker), fs::metadata(reference)) {
        (Ok(marker), Ok(reference)) => marker.uid() == reference.uid(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn owners_match(_marker: &Path, reference: &Path) -> bool {
    reference.exists()
}
