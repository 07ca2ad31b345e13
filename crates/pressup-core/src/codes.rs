//! Machine-readable error codes shared by the upgrader, the stats reporter
//! and the auto-update failure record.

pub const UP_TO_DATE: &str = "up_to_date";
pub const LOCKED: &str = "locked";

pub const FS_UNAVAILABLE: &str = "fs_unavailable";
pub const FS_ERROR: &str = "fs_error";
pub const FS_NO_ROOT_DIR: &str = "fs_no_root_dir";
pub const FS_NO_CONTENT_DIR: &str = "fs_no_content_dir";
pub const FS_NO_FOLDER: &str = "fs_no_folder";

pub const NO_PACKAGE: &str = "no_package";
pub const DOWNLOAD_FAILED: &str = "download_failed";
pub const SIGNATURE_NO_SIGNATURE: &str = "signature_verification_no_signature";
pub const SIGNATURE_FAILED: &str = "signature_verification_failed";
pub const INCOMPATIBLE_ARCHIVE: &str = "incompatible_archive";
pub const INCOMPATIBLE_ARCHIVE_EMPTY: &str = "incompatible_archive_empty";
pub const MKDIR_FAILED_ZIPARCHIVE: &str = "mkdir_failed_ziparchive";
pub const EXTRACT_FAILED_ZIPARCHIVE: &str = "extract_failed_ziparchive";
pub const COPY_FAILED_ZIPARCHIVE: &str = "copy_failed_ziparchive";
pub const DISK_FULL_UNZIP_FILE: &str = "disk_full_unzip_file";

pub const BAD_REQUEST: &str = "bad_request";
pub const FOLDER_EXISTS: &str = "folder_exists";
pub const REMOVE_OLD_FAILED: &str = "remove_old_failed";
pub const MKDIR_FAILED_DESTINATION: &str = "mkdir_failed_destination";
pub const COPY_FAILED_COPY_DIR: &str = "copy_failed_copy_dir";
pub const MKDIR_FAILED_COPY_DIR: &str = "mkdir_failed_copy_dir";

pub const MISSING_VERSION_FILE: &str = "missing_version_file";
pub const INSANE_DISTRO: &str = "insane_distro";
pub const PHP_MYSQL_NOT_COMPATIBLE: &str = "php_mysql_not_compatible";
pub const PHP_NOT_COMPATIBLE: &str = "php_not_compatible";
pub const MYSQL_NOT_COMPATIBLE: &str = "mysql_not_compatible";
pub const PHP_NOT_COMPATIBLE_JSON: &str = "php_not_compatible_json";
pub const FILES_NOT_WRITABLE: &str = "files_not_writable";
pub const COPY_FAILED_FOR_UPDATE_CORE_FILE: &str = "copy_failed_for_update_core_file";
pub const COPY_FAILED_FOR_VERSION_FILE: &str = "copy_failed_for_version_file";
pub const COPY_FAILED_CORE_COPY_DIR: &str = "copy_failed__copy_dir";
pub const MKDIR_FAILED_CORE_COPY_DIR: &str = "mkdir_failed__copy_dir";
pub const DISK_FULL: &str = "disk_full";
pub const COPY_FAILED_FOR_NEW_BUNDLED_PREFIX: &str = "copy_failed_for_new_bundled_";

pub const ROLLBACK_WAS_REQUIRED: &str = "rollback_was_required";

pub const RETRY_SUFFIX: &str = "_retry";
pub const LANGUAGES_SUFFIX: &str = "_languages";
