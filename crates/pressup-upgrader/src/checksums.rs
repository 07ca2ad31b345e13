use std::path::Path;

use pressup_core::{is_content_path, is_root_document, ChecksumSet};
use pressup_security::sha256_hex;
use tracing::{debug, warn};

use crate::download::HttpClient;
use crate::filesystem::Filesystem;
use crate::layout::{InstallLayout, VERSION_FILE};

/// Where per-release checksum sets come from. `None` means unavailable,
/// which callers treat as a failed check.
pub trait ChecksumSource {
    fn fetch(&self, version: &str, locale: &str) -> Option<ChecksumSet>;
}

pub struct HttpChecksumService<'a> {
    http: &'a dyn HttpClient,
    api_url: String,
}

impl<'a> HttpChecksumService<'a> {
    pub fn new(http: &'a dyn HttpClient, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, version: &str, locale: &str) -> String {
        format!(
            "{}/core/checksums/1.0/?version={version}&locale={locale}",
            self.api_url
        )
    }
}

impl ChecksumSource for HttpChecksumService<'_> {
    fn fetch(&self, version: &str, locale: &str) -> Option<ChecksumSet> {
        let url = self.url_for(version, locale);
        let response = match self.http.get(&url) {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(%url, status = response.status, "checksum service returned an error");
                return None;
            }
            Err(err) => {
                warn!(%url, error = %format!("{err:#}"), "checksum service unreachable");
                return None;
            }
        };
        match ChecksumSet::from_api_json(&response.body, version, locale) {
            Ok(set) => Some(set),
            Err(err) => {
                warn!(%url, error = %format!("{err:#}"), "checksum response unusable");
                None
            }
        }
    }
}

/// Fixed sets, matched by version and then by locale when more than one
/// set carries the version.
#[derive(Debug, Clone, Default)]
pub struct StaticChecksums {
    sets: Vec<ChecksumSet>,
}

impl StaticChecksums {
    pub fn new(sets: Vec<ChecksumSet>) -> Self {
        Self { sets }
    }
}

impl ChecksumSource for StaticChecksums {
    fn fetch(&self, version: &str, locale: &str) -> Option<ChecksumSet> {
        let mut candidates = self.sets.iter().filter(|set| set.version == version);
        let first = candidates.clone().next()?;
        Some(
            candidates
                .find(|set| set.locale == locale)
                .unwrap_or(first)
                .clone(),
        )
    }
}

pub fn file_hash(filesystem: &dyn Filesystem, path: &Path) -> Option<String> {
    filesystem
        .get_contents(path)
        .map(|contents| sha256_hex(&contents))
}

fn matches(filesystem: &dyn Filesystem, path: &Path, expected: &str) -> bool {
    file_hash(filesystem, path).is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
}

/// Every core file of the running release is present and unmodified. A
/// missing set fails the check.
pub fn check_files(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    set: Option<&ChecksumSet>,
) -> bool {
    let Some(set) = set else {
        return false;
    };
    for (path, expected) in set.core_entries(layout.content_dir_name()) {
        let local = layout.resolve(path);
        if !filesystem.exists(&local) || !matches(filesystem, &local, expected) {
            debug!(path, "installed file differs from release checksum");
            return false;
        }
    }
    true
}

/// Core files that are missing or differ from `set`, relative to the root.
pub fn changed_files(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    set: &ChecksumSet,
) -> Vec<String> {
    set.core_entries(layout.content_dir_name())
        .filter(|(path, expected)| !matches(filesystem, &layout.resolve(path), expected))
        .map(|(path, _)| path.to_string())
        .collect()
}

/// Files the core copy may leave alone, and those it must be able to
/// overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub skip: Vec<String>,
    pub check_is_writable: Vec<String>,
}

/// Starts from the content dir and the version file, which the copy
/// handles separately, then adds every installed file already matching the
/// target release. Files that differ must be writable.
pub fn plan_copy(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    set: Option<&ChecksumSet>,
    distro_root: &Path,
) -> CopyPlan {
    let mut plan = CopyPlan {
        skip: vec![layout.content_dir_name().to_string(), VERSION_FILE.to_string()],
        check_is_writable: Vec::new(),
    };
    let Some(set) = set else {
        return plan;
    };

    for (path, expected) in set.iter() {
        if is_content_path(path, layout.content_dir_name()) {
            continue;
        }
        let local = layout.resolve(path);
        if !filesystem.exists(&local) || !filesystem.exists(&distro_root.join(path)) {
            continue;
        }
        if is_root_document(path) {
            continue;
        }
        if matches(filesystem, &local, expected) {
            plan.skip.push(path.to_string());
        } else {
            plan.check_is_writable.push(path.to_string());
        }
    }
    plan
}

/// Post-copy verification. Matching files and root documents join `skip`;
/// files shipped in the package that are missing or differ are returned.
pub fn verify_copy(
    filesystem: &dyn Filesystem,
    layout: &InstallLayout,
    set: Option<&ChecksumSet>,
    distro_root: &Path,
    skip: &mut Vec<String>,
) -> Vec<String> {
    let Some(set) = set else {
        return Vec::new();
    };

    let mut failed = Vec::new();
    for (path, expected) in set.iter() {
        if is_content_path(path, layout.content_dir_name()) {
            continue;
        }
        if !filesystem.exists(&distro_root.join(path)) {
            continue;
        }
        if is_root_document(path) {
            skip.push(path.to_string());
            continue;
        }
        let local = layout.resolve(path);
        if filesystem.exists(&local) && matches(filesystem, &local, expected) {
            skip.push(path.to_string());
        } else {
            failed.push(path.to_string());
        }
    }
    failed
}
