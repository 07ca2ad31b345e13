use std::path::{Path, PathBuf};

use pressup_core::messages::{self, interpolate};
use pressup_core::{codes, ErrorData, UpgradeError, VersionManifest};
use tracing::debug;

use crate::filesystem::{EntryType, Filesystem, FS_CHMOD_FILE};
use crate::layout::{InstallLayout, MANIFEST_FILE, VERSION_FILE};

pub const DISTRO_PREFIX: &str = "ClassicPress-";
pub const LEGACY_DISTRO_NAME: &str = "wordpress";

/// The single release folder inside an unpacked working directory. Anything
/// else (several entries, a stray file, a folder without the manifest or the
/// version file) is rejected with `insane_distro`.
pub fn resolve_distribution_root(
    filesystem: &dyn Filesystem,
    working_dir: &Path,
) -> Result<PathBuf, UpgradeError> {
    let insane = || UpgradeError::new(codes::INSANE_DISTRO, messages::INSANE_DISTRO);

    let listing = filesystem.dirlist(working_dir).ok_or_else(insane)?;
    let mut entries = listing.values();
    let (Some(entry), None) = (entries.next(), entries.next()) else {
        debug!(dir = %working_dir.display(), entries = listing.len(), "package does not hold exactly one entry");
        return Err(insane());
    };

    let named_like_release =
        entry.name.starts_with(DISTRO_PREFIX) || entry.name == LEGACY_DISTRO_NAME;
    if !named_like_release || !entry.is_dir() {
        debug!(name = %entry.name, "package root is not a release folder");
        return Err(insane());
    }

    let root = working_dir.join(&entry.name);
    for required in [MANIFEST_FILE, VERSION_FILE] {
        if !filesystem.is_file(&root.join(required)) {
            debug!(root = %root.display(), missing = required, "release folder is incomplete");
            return Err(insane());
        }
    }
    Ok(root)
}

/// Reads the running release from the installed version file.
pub fn installed_version(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
) -> Result<VersionManifest, UpgradeError> {
    let path = layout.version_file();
    let missing = || {
        UpgradeError::new(
            codes::MISSING_VERSION_FILE,
            interpolate(messages::MISSING_VERSION_FILE, &[VERSION_FILE]),
        )
        .with_data(ErrorData::Text(VERSION_FILE.to_string()))
    };
    let contents = filesystem.get_contents(&path).ok_or_else(missing)?;
    VersionManifest::parse(&String::from_utf8_lossy(&contents)).map_err(|err| {
        debug!(path = %path.display(), error = %format!("{err:#}"), "unreadable version file");
        missing()
    })
}

/// Reads the staged release's version file through a copy next to the
/// working directory, which is removed again once read.
pub fn staged_version(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    distro_root: &Path,
) -> Result<VersionManifest, UpgradeError> {
    let copy_failed = || {
        UpgradeError::new(codes::COPY_FAILED_FOR_VERSION_FILE, messages::COPY_FAILED)
            .with_data(ErrorData::Text(VERSION_FILE.to_string()))
    };

    let scratch = layout.version_current_path();
    if !filesystem.copy(&distro_root.join(VERSION_FILE), &scratch, true, FS_CHMOD_FILE) {
        filesystem.delete(&scratch, false, Some(EntryType::File));
        return Err(copy_failed());
    }
    let contents = filesystem.get_contents(&scratch);
    filesystem.delete(&scratch, false, Some(EntryType::File));

    let contents = contents.ok_or_else(copy_failed)?;
    VersionManifest::parse(&String::from_utf8_lossy(&contents)).map_err(|err| {
        UpgradeError::new(
            codes::MISSING_VERSION_FILE,
            interpolate(messages::MISSING_VERSION_FILE, &[VERSION_FILE]),
        )
        .with_data(ErrorData::Text(format!("{err:#}")))
    })
}
