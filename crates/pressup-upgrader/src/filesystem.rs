//! The transport contract every filesystem backend implements.
//!
//! Operations report plain success flags rather than errors: the callers
//! decide which failures are fatal and attach their own codes, so a
//! transport never has to know about upgrade semantics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const FS_CHMOD_DIR: u32 = 0o755;
pub const FS_CHMOD_FILE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Dir,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub entry_type: EntryType,
    pub permissions: Option<u32>,
    pub size: u64,
    pub mtime: Option<u64>,
}

impl DirEntryInfo {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Dir
    }
}

pub trait Filesystem {
    /// Transport identifier, e.g. `direct`.
    fn method(&self) -> &str;

    fn connect(&self) -> bool;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn is_writable(&self, path: &Path) -> bool;

    /// Entries directly under `path`, keyed by name. A file path lists just
    /// that file; a missing path yields `None`.
    fn dirlist(&self, path: &Path) -> Option<BTreeMap<String, DirEntryInfo>>;

    fn mkdir(&self, path: &Path, mode: u32) -> bool;

    fn copy(&self, source: &Path, destination: &Path, overwrite: bool, mode: u32) -> bool;

    fn move_path(&self, source: &Path, destination: &Path, overwrite: bool) -> bool;

    fn delete(&self, path: &Path, recursive: bool, type_hint: Option<EntryType>) -> bool;

    fn chmod(&self, path: &Path, mode: u32, recursive: bool) -> bool;

    fn get_contents(&self, path: &Path) -> Option<Vec<u8>>;

    fn put_contents(&self, path: &Path, contents: &[u8], mode: u32) -> bool;

    fn atime(&self, path: &Path) -> Option<u64>;

    fn mtime(&self, path: &Path) -> Option<u64>;

    fn size(&self, path: &Path) -> Option<u64>;

    /// Free bytes on the volume holding `path`, when the transport can tell.
    fn available_space(&self, _path: &Path) -> Option<u64> {
        None
    }

    /// Maps a local path to the transport's view of it. Remote transports
    /// search for the folder; local ones return it unchanged.
    fn find_folder(&self, path: &Path) -> Option<PathBuf> {
        Some(path.to_path_buf())
    }
}
