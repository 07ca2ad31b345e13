use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pressup_core::messages::{self, interpolate};
use pressup_core::{codes, ErrorData, UpgradeError};
use tracing::debug;

use crate::download::{download_to_temp, is_remote, HttpClient, SignaturePolicy};
use crate::events::UpgradeEvents;
use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_DIR};
use crate::layout::InstallLayout;
use crate::stager::{copy_dir, extract_archive, ExtractOptions};
use crate::transport::check_connection;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub clear_destination: bool,
    pub clear_working: bool,
    pub abort_if_destination_exists: bool,
    /// Free-form context handed to hooks (`type`, `action`, ...).
    pub hook_extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub package: String,
    pub destination: PathBuf,
    pub clear_destination: bool,
    pub clear_working: bool,
    pub abort_if_destination_exists: bool,
    pub hook_extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub source: PathBuf,
    pub source_files: Vec<String>,
    pub destination: PathBuf,
    pub destination_name: String,
    pub local_destination: PathBuf,
    pub remote_destination: PathBuf,
    pub clear_destination: bool,
}

/// Extension point around [`Upgrader::install_package`]. Any error aborts
/// the remaining steps.
pub trait InstallHook {
    fn pre_install(&self, _request: &InstallRequest) -> Result<(), UpgradeError> {
        Ok(())
    }

    fn source_selection(
        &self,
        source: PathBuf,
        _remote_source: &Path,
        _request: &InstallRequest,
    ) -> Result<PathBuf, UpgradeError> {
        Ok(source)
    }

    fn clear_destination(
        &self,
        removed: bool,
        _destination: &Path,
        _request: &InstallRequest,
    ) -> Result<bool, UpgradeError> {
        Ok(removed)
    }

    fn post_install(
        &self,
        _outcome: &InstallOutcome,
        _request: &InstallRequest,
    ) -> Result<(), UpgradeError> {
        Ok(())
    }
}

/// Hooks run in registration order.
#[derive(Default)]
pub struct HookPipeline {
    hooks: Vec<Box<dyn InstallHook>>,
}

impl HookPipeline {
    pub fn push(&mut self, hook: Box<dyn InstallHook>) {
        self.hooks.push(hook);
    }

    fn pre_install(&self, request: &InstallRequest) -> Result<(), UpgradeError> {
        self.hooks
            .iter()
            .try_for_each(|hook| hook.pre_install(request))
    }

    fn source_selection(
        &self,
        source: PathBuf,
        remote_source: &Path,
        request: &InstallRequest,
    ) -> Result<PathBuf, UpgradeError> {
        self.hooks.iter().try_fold(source, |source, hook| {
            hook.source_selection(source, remote_source, request)
        })
    }

    fn clear_destination(
        &self,
        removed: bool,
        destination: &Path,
        request: &InstallRequest,
    ) -> Result<bool, UpgradeError> {
        self.hooks.iter().try_fold(removed, |removed, hook| {
            hook.clear_destination(removed, destination, request)
        })
    }

    fn post_install(
        &self,
        outcome: &InstallOutcome,
        request: &InstallRequest,
    ) -> Result<(), UpgradeError> {
        self.hooks
            .iter()
            .try_for_each(|hook| hook.post_install(outcome, request))
    }
}

/// Download, unpack and install pipeline shared by every package kind.
pub struct Upgrader<'a> {
    filesystem: &'a dyn Filesystem,
    layout: &'a InstallLayout,
    http: &'a dyn HttpClient,
    events: &'a dyn UpgradeEvents,
    signatures: SignaturePolicy,
    background: bool,
    protected_directories: Vec<PathBuf>,
    hooks: HookPipeline,
}

impl<'a> Upgrader<'a> {
    pub fn new(
        filesystem: &'a dyn Filesystem,
        layout: &'a InstallLayout,
        http: &'a dyn HttpClient,
        events: &'a dyn UpgradeEvents,
    ) -> Self {
        let protected_directories = vec![
            layout.root().to_path_buf(),
            layout.content_dir(),
            layout.plugins_dir(),
            layout.themes_dir(),
        ];
        Self {
            filesystem,
            layout,
            http,
            events,
            signatures: SignaturePolicy::default(),
            background: false,
            protected_directories,
            hooks: HookPipeline::default(),
        }
    }

    pub fn with_signatures(mut self, signatures: SignaturePolicy) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn InstallHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.filesystem
    }

    pub fn fs_connect(&self, directories: &[PathBuf]) -> Result<(), UpgradeError> {
        check_connection(self.filesystem, self.layout, directories)
    }

    /// Local paths pass through untouched; URLs are fetched into the state
    /// temp directory.
    pub fn download_package(&self, locator: &str) -> Result<PathBuf, UpgradeError> {
        if !is_remote(locator) && !locator.trim().is_empty() && Path::new(locator).exists() {
            return Ok(PathBuf::from(locator));
        }
        if locator.trim().is_empty() {
            return Err(UpgradeError::new(codes::NO_PACKAGE, messages::NO_PACKAGE));
        }

        self.events
            .feedback(&interpolate(messages::DOWNLOADING_PACKAGE, &[locator]));
        download_to_temp(self.http, locator, &self.layout.tmp_dir(), &self.signatures)
    }

    /// Extracts `package` into a fresh working directory under the upgrade
    /// folder, clearing whatever earlier attempts left there.
    pub fn unpack_package(
        &self,
        package: &Path,
        delete_package: bool,
    ) -> Result<PathBuf, UpgradeError> {
        self.events.feedback(messages::UNPACK_PACKAGE);

        let upgrade_folder = self.layout.upgrade_dir();
        if let Some(stale) = self.filesystem.dirlist(&upgrade_folder) {
            for name in stale.keys() {
                self.filesystem
                    .delete(&upgrade_folder.join(name), true, None);
            }
        }

        let working_dir = upgrade_folder.join(working_dir_name(package));
        if self.filesystem.is_dir(&working_dir) {
            self.filesystem
                .delete(&working_dir, true, Some(EntryType::Dir));
        }

        let result = extract_archive(
            self.filesystem,
            package,
            &working_dir,
            ExtractOptions {
                background: self.background,
            },
        );

        if delete_package {
            if let Err(err) = fs::remove_file(package) {
                debug!(path = %package.display(), error = %err, "failed to remove downloaded package");
            }
        }

        if let Err(err) = result {
            self.filesystem
                .delete(&working_dir, true, Some(EntryType::Dir));
            return Err(err);
        }
        Ok(working_dir)
    }

    pub fn clear_destination(&self, destination: &Path) -> bool {
        if !self.filesystem.exists(destination) {
            return true;
        }
        self.filesystem.delete(destination, true, None)
    }

    pub fn install_package(&self, request: &InstallRequest) -> Result<InstallOutcome, UpgradeError> {
        if request.source.as_os_str().is_empty() || request.destination.as_os_str().is_empty() {
            return Err(UpgradeError::new(codes::BAD_REQUEST, messages::BAD_REQUEST));
        }
        self.events.feedback(messages::INSTALLING_PACKAGE);
        self.hooks.pre_install(request)?;

        let remote_source = request.source.clone();
        let local_destination = request.destination.clone();
        let source_files = self
            .filesystem
            .dirlist(&remote_source)
            .map(|listing| listing.into_keys().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut remote_destination = self
            .filesystem
            .find_folder(&local_destination)
            .unwrap_or_else(|| local_destination.clone());

        let source = match source_files.as_slice() {
            [] => {
                return Err(UpgradeError::new(
                    codes::INCOMPATIBLE_ARCHIVE_EMPTY,
                    messages::INCOMPATIBLE_ARCHIVE,
                )
                .with_data(ErrorData::Text(messages::NO_FILES.to_string())));
            }
            [only] if self.filesystem.is_dir(&remote_source.join(only)) => remote_source.join(only),
            _ => remote_source.clone(),
        };
        let source = self
            .hooks
            .source_selection(source, &remote_source, request)?;

        let mut destination = local_destination.clone();
        if self.protected_directories.contains(&destination) {
            if let Some(name) = source.file_name() {
                remote_destination = remote_destination.join(name);
                destination = destination.join(name);
            }
        }

        if request.clear_destination {
            self.events.feedback(messages::REMOVE_OLD);
            let removed = self.clear_destination(&remote_destination);
            let removed = self
                .hooks
                .clear_destination(removed, &local_destination, request)?;
            if !removed {
                return Err(UpgradeError::new(
                    codes::REMOVE_OLD_FAILED,
                    messages::REMOVE_OLD_FAILED,
                ));
            }
        } else if request.abort_if_destination_exists && self.filesystem.exists(&remote_destination) {
            self.filesystem
                .delete(&remote_source, true, Some(EntryType::Dir));
            return Err(
                UpgradeError::new(codes::FOLDER_EXISTS, messages::FOLDER_EXISTS)
                    .with_path(&remote_destination),
            );
        }

        if !self.filesystem.exists(&remote_destination)
            && !self.filesystem.mkdir(&remote_destination, FS_CHMOD_DIR)
        {
            return Err(
                UpgradeError::new(codes::MKDIR_FAILED_DESTINATION, messages::MKDIR_FAILED)
                    .with_path(&remote_destination),
            );
        }

        let copied = copy_dir(self.filesystem, &source, &remote_destination, &[]);
        if request.clear_working {
            self.filesystem
                .delete(&remote_source, true, Some(EntryType::Dir));
        }
        copied?;

        let destination_name = destination
            .strip_prefix(&local_destination)
            .ok()
            .and_then(|rest| rest.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let outcome = InstallOutcome {
            source,
            source_files,
            destination,
            destination_name,
            local_destination,
            remote_destination,
            clear_destination: request.clear_destination,
        };
        self.hooks.post_install(&outcome, request)?;
        Ok(outcome)
    }

    /// Full pipeline. The working directory never outlives the call.
    pub fn run(&self, request: &RunRequest) -> Result<InstallOutcome, UpgradeError> {
        let result = self.run_steps(request);
        if let Err(err) = &result {
            self.events.error(err);
        }
        result
    }

    fn run_steps(&self, request: &RunRequest) -> Result<InstallOutcome, UpgradeError> {
        self.fs_connect(&[self.layout.content_dir(), request.destination.clone()])?;

        let download = self.download_package(&request.package)?;
        let delete_package = download != Path::new(&request.package);
        let working_dir = self.unpack_package(&download, delete_package)?;

        let result = self.install_package(&InstallRequest {
            source: working_dir.clone(),
            destination: request.destination.clone(),
            clear_destination: request.clear_destination,
            clear_working: request.clear_working,
            abort_if_destination_exists: request.abort_if_destination_exists,
            hook_extra: request.hook_extra.clone(),
        });

        if self.filesystem.exists(&working_dir) {
            self.filesystem
                .delete(&working_dir, true, Some(EntryType::Dir));
        }
        result
    }
}

/// `ClassicPress-1.1.0-1a2b.tmp` → `ClassicPress-1.1.0-1a2b`.
pub fn working_dir_name(package: &Path) -> String {
    let name = package
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".tmp").unwrap_or(&name);
    name.strip_suffix(".zip").unwrap_or(name).to_string()
}
