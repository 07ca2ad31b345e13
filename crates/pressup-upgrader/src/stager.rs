use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use pressup_core::{codes, is_relative_path, messages, ErrorData, UpgradeError};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_DIR, FS_CHMOD_FILE};

/// Extracted size times this factor must fit on disk, since the archive and
/// its extracted copy coexist until cleanup.
pub const DISK_SPACE_FACTOR: f64 = 2.1;

const IGNORED_PREFIX: &str = "__MACOSX/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Running from a scheduled task rather than an operator request.
    pub background: bool,
}

struct ArchiveEntry {
    index: usize,
    name: String,
    is_dir: bool,
    size: u64,
}

/// Extracts a zip archive into `destination` through the transport.
pub fn extract_archive(
    filesystem: &dyn Filesystem,
    archive_path: &Path,
    destination: &Path,
    options: ExtractOptions,
) -> Result<(), UpgradeError> {
    let file = File::open(archive_path).map_err(|err| incompatible_archive(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| incompatible_archive(err.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| incompatible_archive(err.to_string()))?;
        let name = entry.name().to_string();

        if name.starts_with(IGNORED_PREFIX) {
            continue;
        }
        if !is_safe_entry_path(&name) || entry.enclosed_name().is_none() {
            debug!(entry = %name, "skipping archive entry with unsafe path");
            continue;
        }

        entries.push(ArchiveEntry {
            index,
            is_dir: entry.is_dir(),
            size: entry.size(),
            name,
        });
    }

    if options.background {
        let uncompressed_size: u64 = entries.iter().map(|entry| entry.size).sum();
        if let Some(available_space) = filesystem.available_space(destination) {
            if available_space > 0
                && uncompressed_size as f64 * DISK_SPACE_FACTOR > available_space as f64
            {
                return Err(UpgradeError::new(
                    codes::DISK_FULL_UNZIP_FILE,
                    messages::DISK_FULL_UNZIP,
                )
                .with_data(ErrorData::DiskSpace {
                    uncompressed_size,
                    available_space,
                }));
            }
        }
    }

    for dir in needed_dirs(filesystem, destination, &entries) {
        if !filesystem.mkdir(&dir, FS_CHMOD_DIR) && !filesystem.is_dir(&dir) {
            let relative = dir.strip_prefix(destination).unwrap_or(&dir);
            return Err(
                UpgradeError::new(codes::MKDIR_FAILED_ZIPARCHIVE, messages::MKDIR_FAILED)
                    .with_path(relative),
            );
        }
    }

    for entry in entries.iter().filter(|entry| !entry.is_dir) {
        if entry.size == 0 && entry.name.ends_with('/') {
            continue;
        }

        let mut contents = Vec::new();
        let read = archive
            .by_index(entry.index)
            .map_err(|err| err.to_string())
            .and_then(|mut file| {
                file.read_to_end(&mut contents)
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = read {
            warn!(entry = %entry.name, error = %err, "failed to read archive entry");
            return Err(UpgradeError::new(
                codes::EXTRACT_FAILED_ZIPARCHIVE,
                messages::EXTRACT_FAILED,
            )
            .with_data(ErrorData::Text(entry.name.clone())));
        }

        if !filesystem.put_contents(&destination.join(&entry.name), &contents, FS_CHMOD_FILE) {
            return Err(
                UpgradeError::new(codes::COPY_FAILED_ZIPARCHIVE, messages::COPY_FAILED)
                    .with_data(ErrorData::Text(entry.name.clone())),
            );
        }
    }

    Ok(())
}

/// Directories that must exist before any file body is written: missing
/// ancestors of the destination plus every directory the entries imply.
/// `BTreeSet` ordering puts parents before their children.
fn needed_dirs(
    filesystem: &dyn Filesystem,
    destination: &Path,
    entries: &[ArchiveEntry],
) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();

    if !filesystem.is_dir(destination) {
        for ancestor in destination.ancestors() {
            if ancestor.as_os_str().is_empty() || filesystem.is_dir(ancestor) {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    for entry in entries {
        let relative = if entry.is_dir {
            Some(Path::new(entry.name.trim_end_matches('/')))
        } else {
            Path::new(&entry.name).parent()
        };
        let Some(relative) = relative.filter(|path| !path.as_os_str().is_empty()) else {
            continue;
        };
        for ancestor in relative.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(destination.join(ancestor));
        }
    }

    dirs
}

/// Rejects parent or current directory segments, absolute paths and drive
/// letters.
pub fn is_safe_entry_path(name: &str) -> bool {
    is_relative_path(name)
}

fn incompatible_archive(detail: String) -> UpgradeError {
    UpgradeError::new(codes::INCOMPATIBLE_ARCHIVE, messages::INCOMPATIBLE_ARCHIVE)
        .with_data(ErrorData::Text(detail))
}

/// Error codes differ between the plugin/theme copier and the core copier;
/// rollback decisions key off the core flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFlavor {
    Generic,
    Core,
}

impl CopyFlavor {
    fn copy_failed(self) -> &'static str {
        match self {
            Self::Generic => codes::COPY_FAILED_COPY_DIR,
            Self::Core => codes::COPY_FAILED_CORE_COPY_DIR,
        }
    }

    fn mkdir_failed(self) -> &'static str {
        match self {
            Self::Generic => codes::MKDIR_FAILED_COPY_DIR,
            Self::Core => codes::MKDIR_FAILED_CORE_COPY_DIR,
        }
    }
}

pub fn copy_dir(
    filesystem: &dyn Filesystem,
    from: &Path,
    to: &Path,
    skip_list: &[String],
) -> Result<(), UpgradeError> {
    copy_tree(filesystem, from, to, skip_list, CopyFlavor::Generic)
}

pub fn core_copy_dir(
    filesystem: &dyn Filesystem,
    from: &Path,
    to: &Path,
    skip_list: &[String],
) -> Result<(), UpgradeError> {
    copy_tree(filesystem, from, to, skip_list, CopyFlavor::Core)
}

/// Depth-first mirror of `from` into `to`. Skip-list entries name direct
/// children; `dir/child` entries apply inside `dir`. Symlinks are not
/// followed. The first failure stops the copy and carries the destination
/// path that failed.
pub fn copy_tree(
    filesystem: &dyn Filesystem,
    from: &Path,
    to: &Path,
    skip_list: &[String],
    flavor: CopyFlavor,
) -> Result<(), UpgradeError> {
    let Some(listing) = filesystem.dirlist(from) else {
        return Err(UpgradeError::new(flavor.copy_failed(), messages::COPY_FAILED).with_path(from));
    };

    for (name, info) in listing {
        if skip_list.iter().any(|item| item == &name) {
            continue;
        }
        let source = from.join(&name);
        let target = to.join(&name);

        match info.entry_type {
            EntryType::File => {
                if !filesystem.copy(&source, &target, true, FS_CHMOD_FILE) {
                    filesystem.chmod(&target, FS_CHMOD_FILE, false);
                    if !filesystem.copy(&source, &target, true, FS_CHMOD_FILE) {
                        return Err(UpgradeError::new(flavor.copy_failed(), messages::COPY_FAILED)
                            .with_path(&target));
                    }
                }
            }
            EntryType::Dir => {
                if !filesystem.is_dir(&target) && !filesystem.mkdir(&target, FS_CHMOD_DIR) {
                    return Err(UpgradeError::new(flavor.mkdir_failed(), messages::MKDIR_FAILED)
                        .with_path(&target));
                }
                let sub_skip_list = sub_skip_list(skip_list, &name);
                copy_tree(filesystem, &source, &target, &sub_skip_list, flavor)?;
            }
            EntryType::Link => {
                debug!(path = %source.display(), "not copying symlink");
            }
        }
    }

    Ok(())
}

fn sub_skip_list(skip_list: &[String], dir_name: &str) -> Vec<String> {
    let prefix = format!("{dir_name}/");
    skip_list
        .iter()
        .filter_map(|item| item.strip_prefix(&prefix))
        .map(str::to_string)
        .collect()
}
