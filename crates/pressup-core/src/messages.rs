//! Human-readable messages that accompany error codes and feedback lines.
//!
//! Templates use printf-style placeholders (`%s`, `%1$s`) and are filled in
//! with [`interpolate`] before they reach an operator.

pub const UP_TO_DATE: &str = "ClassicPress is at the latest version.";
pub const LOCKED: &str = "Another update is currently in progress.";
pub const NO_PACKAGE: &str = "Update package not available.";
pub const DOWNLOADING_PACKAGE: &str = "Downloading update from %s…";
pub const DOWNLOAD_FAILED: &str = "Download failed.";
pub const SIGNATURE_NO_SIGNATURE: &str = "The authenticity of %s could not be verified as no signature was found.";
pub const SIGNATURE_FAILED: &str = "The authenticity of %s could not be verified.";
pub const UNPACK_PACKAGE: &str = "Unpacking the update…";
pub const INCOMPATIBLE_ARCHIVE: &str = "The package could not be installed.";
pub const NO_FILES: &str = "The package contains no files.";
pub const MKDIR_FAILED: &str = "Could not create directory.";
pub const EXTRACT_FAILED: &str = "Could not extract file from archive.";
pub const COPY_FAILED: &str = "Could not copy file.";
pub const DISK_FULL_UNZIP: &str = "Could not copy files. You may have run out of disk space.";
pub const BAD_REQUEST: &str = "Invalid data provided.";
pub const FOLDER_EXISTS: &str = "Destination folder already exists.";
pub const REMOVE_OLD: &str = "Removing the old version…";
pub const REMOVE_OLD_FAILED: &str = "Could not remove the old version.";
pub const INSTALLING_PACKAGE: &str = "Installing the latest version…";
pub const MAINTENANCE_START: &str = "Enabling Maintenance mode…";
pub const MAINTENANCE_END: &str = "Disabling Maintenance mode…";

pub const FS_UNAVAILABLE: &str = "Could not access filesystem.";
pub const FS_ERROR: &str = "Filesystem error.";
pub const FS_NO_ROOT_DIR: &str = "Unable to locate ClassicPress root directory.";
pub const FS_NO_CONTENT_DIR: &str = "Unable to locate ClassicPress content directory (%s).";
pub const FS_NO_FOLDER: &str = "Unable to locate needed folder (%s).";

pub const MISSING_VERSION_FILE: &str = "Could not read the installed version from %s.";
pub const VERIFYING_FILES: &str = "Verifying the unpacked files…";
pub const INSANE_DISTRO: &str = "The update could not be unpacked";
pub const PHP_MYSQL_NOT_COMPATIBLE: &str = "The update cannot be installed because ClassicPress %1$s requires PHP version %2$s or higher and MySQL version %3$s or higher. You are running PHP version %4$s and MySQL version %5$s.";
pub const PHP_NOT_COMPATIBLE: &str = "The update cannot be installed because ClassicPress %1$s requires PHP version %2$s or higher. You are running version %3$s.";
pub const MYSQL_NOT_COMPATIBLE: &str = "The update cannot be installed because ClassicPress %1$s requires MySQL version %2$s or higher. You are running version %3$s.";
pub const PHP_NOT_COMPATIBLE_JSON: &str = "The update cannot be installed because ClassicPress %1$s requires the %2$s PHP extension.";
pub const FILES_NOT_WRITABLE: &str = "The update cannot be installed because we will be unable to copy some files. This is usually due to inconsistent file permissions.";
pub const COPYING_FILES: &str = "Copying the required files…";
pub const DISK_FULL: &str = "There is not enough free disk space to complete the update.";
pub const ROLLBACK_START: &str = "Attempting to roll back to previous version.";
pub const ROLLBACK_WAS_REQUIRED: &str = "Due to an error during updating, ClassicPress has rolled back to your previous version.";
pub const CORE_UPDATED: &str = "ClassicPress updated successfully to version %s.";

/// Fills printf-style placeholders. `%s` consumes arguments in order,
/// `%N$s` picks argument `N` (1-based) and `%%` is a literal percent sign.
/// Placeholders without a matching argument are left untouched.
pub fn interpolate(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next_arg = 0_usize;
    let mut rest = template;

    while let Some(index) = rest.find('%') {
        out.push_str(&rest[..index]);
        let tail = &rest[index + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            out.push('%');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix('s') {
            match args.get(next_arg) {
                Some(value) => out.push_str(value),
                None => out.push_str("%s"),
            }
            next_arg += 1;
            rest = after;
            continue;
        }

        let digits = tail.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 && tail[digits..].starts_with("$s") {
            let position = tail[..digits].parse::<usize>().unwrap_or(0);
            match position.checked_sub(1).and_then(|slot| args.get(slot)) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[index..index + digits + 3]),
            }
            rest = &tail[digits + 2..];
            continue;
        }

        out.push('%');
        rest = tail;
    }

    out.push_str(rest);
    out
}
