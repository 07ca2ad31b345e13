use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::filesystem::{DirEntryInfo, EntryType, Filesystem};

/// Local disk transport over `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct DirectFilesystem;

impl DirectFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for DirectFilesystem {
    fn method(&self) -> &str {
        "direct"
    }

    fn connect(&self) -> bool {
        true
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_writable(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(metadata) => !metadata.permissions().readonly(),
            Err(_) => false,
        }
    }

    fn dirlist(&self, path: &Path) -> Option<BTreeMap<String, DirEntryInfo>> {
        let metadata = fs::metadata(path).ok()?;
        let mut listing = BTreeMap::new();

        if !metadata.is_dir() {
            let name = path.file_name()?.to_string_lossy().into_owned();
            listing.insert(name.clone(), entry_info(name, &metadata, EntryType::File));
            return Some(listing);
        }

        for entry in fs::read_dir(path).ok()? {
            let Ok(entry) = entry else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let entry_type = if file_type.is_symlink() {
                EntryType::Link
            } else if file_type.is_dir() {
                EntryType::Dir
            } else {
                EntryType::File
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            listing.insert(name.clone(), entry_info(name, &metadata, entry_type));
        }
        Some(listing)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> bool {
        if let Err(err) = fs::create_dir(path) {
            debug!(path = %path.display(), error = %err, "mkdir failed");
            return false;
        }
        self.chmod(path, mode, false);
        true
    }

    fn copy(&self, source: &Path, destination: &Path, overwrite: bool, mode: u32) -> bool {
        if !overwrite && self.exists(destination) {
            return false;
        }
        if let Err(err) = fs::copy(source, destination) {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                error = %err,
                "copy failed"
            );
            return false;
        }
        self.chmod(destination, mode, false);
        true
    }

    fn move_path(&self, source: &Path, destination: &Path, overwrite: bool) -> bool {
        if self.exists(destination) {
            if !overwrite || !self.delete(destination, true, None) {
                return false;
            }
        }
        if fs::rename(source, destination).is_ok() {
            return true;
        }

        // Cross-device moves of single files fall back to copy and delete.
        if self.is_file(source)
            && self.copy(source, destination, true, permissions_of(source).unwrap_or(0o644))
        {
            return self.delete(source, false, Some(EntryType::File));
        }
        false
    }

    fn delete(&self, path: &Path, recursive: bool, type_hint: Option<EntryType>) -> bool {
        let Ok(metadata) = fs::symlink_metadata(path) else {
            return false;
        };
        let result = if type_hint == Some(EntryType::File) || !metadata.is_dir() {
            fs::remove_file(path)
        } else if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "delete failed");
                false
            }
        }
    }

    fn chmod(&self, path: &Path, mode: u32, recursive: bool) -> bool {
        let changed = set_mode(path, mode).is_ok();
        if !recursive || !self.is_dir(path) {
            return changed;
        }
        let Some(listing) = self.dirlist(path) else {
            return false;
        };
        listing
            .keys()
            .fold(changed, |ok, name| self.chmod(&path.join(name), mode, true) && ok)
    }

    fn get_contents(&self, path: &Path) -> Option<Vec<u8>> {
        fs::read(path).ok()
    }

    fn put_contents(&self, path: &Path, contents: &[u8], mode: u32) -> bool {
        if let Err(err) = fs::write(path, contents) {
            debug!(path = %path.display(), error = %err, "write failed");
            return false;
        }
        self.chmod(path, mode, false);
        true
    }

    fn atime(&self, path: &Path) -> Option<u64> {
        fs::metadata(path)
            .and_then(|metadata| metadata.accessed())
            .ok()
            .and_then(unix_seconds)
    }

    fn mtime(&self, path: &Path) -> Option<u64> {
        fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(unix_seconds)
    }

    fn size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).map(|metadata| metadata.len()).ok()
    }

    fn available_space(&self, path: &Path) -> Option<u64> {
        let ancestor = nearest_existing_ancestor(path)?;
        fs2::available_space(&ancestor).ok()
    }
}

fn entry_info(name: String, metadata: &fs::Metadata, entry_type: EntryType) -> DirEntryInfo {
    DirEntryInfo {
        name,
        entry_type,
        permissions: mode_of(metadata),
        size: metadata.len(),
        mtime: metadata.modified().ok().and_then(unix_seconds),
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
}

fn unix_seconds(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_secs())
}

fn permissions_of(path: &Path) -> Option<u32> {
    fs::metadata(path).ok().as_ref().and_then(mode_of)
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions)
}
