mod auto_update;
mod checksums;
mod core_upgrader;
mod direct;
mod distro;
mod download;
mod events;
mod filesystem;
mod layout;
mod lock;
pub mod maintenance;
mod stager;
mod state;
mod stats;
mod transport;
mod update_core;
mod upgrader;
mod version_check;

pub use auto_update::{
    load_failure, record_failure, run_auto_update, should_update_to_version, AutoUpdateOutcome,
    AutoUpdatePolicy, AutoUpdateSetting, FailureRecord, TRANSIENT_FAILURES,
};
pub use checksums::{
    changed_files, check_files, file_hash, plan_copy, verify_copy, ChecksumSource, CopyPlan,
    HttpChecksumService, StaticChecksums,
};
pub use core_upgrader::{CoreUpgrader, UpgradeArgs, UpgradeSettings};
pub use direct::DirectFilesystem;
pub use distro::{
    installed_version, resolve_distribution_root, staged_version, DISTRO_PREFIX,
    LEGACY_DISTRO_NAME,
};
pub use download::{
    download_to_temp, is_remote, HttpClient, HttpResponse, ReqwestClient, SignaturePolicy,
    CHECKSUM_HEADER, SIGNATURE_SUFFIX,
};
pub use events::{TracingEvents, UpgradeEvents};
pub use filesystem::{DirEntryInfo, EntryType, Filesystem, FS_CHMOD_DIR, FS_CHMOD_FILE};
pub use layout::{
    InstallLayout, DEFAULT_CONTENT_DIR, MAINTENANCE_FILE, MANIFEST_FILE, UPDATE_CORE_FILE,
    VERSION_FILE,
};
pub use lock::{
    unix_now, FileLockStore, LockManager, LockStore, LockToken, MemoryLockStore,
    CORE_UPDATER_LOCK, CORE_UPDATER_TTL,
};
pub use maintenance::{MaintenanceFlag, MaintenanceStatus, MAINTENANCE_STALE_AFTER_SECS};
pub use stager::{
    copy_dir, copy_tree, core_copy_dir, extract_archive, is_safe_entry_path, CopyFlavor,
    ExtractOptions, DISK_SPACE_FACTOR,
};
pub use state::{OptionStore, UpdateCoreCache, AUTO_CORE_UPDATE_FAILED_OPTION, UPDATE_CORE_OPTION};
pub use stats::{HttpStatsReporter, NoStats, StatsReporter, UpgradeStats};
pub use transport::{
    check_connection, detect_method, TransportFactory, TransportOptions, TransportRegistry,
};
pub use update_core::{ServerEnvironment, UpdateCore};
pub use upgrader::{
    working_dir_name, HookPipeline, InstallHook, InstallOutcome, InstallRequest, RunRequest,
    Upgrader,
};
pub use version_check::{cached_updates, parse_offers, VersionCheckClient};
