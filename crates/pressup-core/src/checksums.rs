use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected content hashes for one release, keyed by path relative to the
/// installation root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    pub version: String,
    pub locale: String,
    pub files: BTreeMap<String, String>,
}

impl ChecksumSet {
    pub fn new(
        version: impl Into<String>,
        locale: impl Into<String>,
        files: BTreeMap<String, String>,
    ) -> Self {
        Self {
            version: version.into(),
            locale: locale.into(),
            files,
        }
    }

    /// Parses the checksum service payload. Both `{"checksums": {path: hash}}`
    /// and the older `{"checksums": {version: {path: hash}}}` shapes are
    /// accepted; `"checksums": false` means the service has no data.
    pub fn from_api_json(input: &[u8], version: &str, locale: &str) -> anyhow::Result<Self> {
        let document: Value =
            serde_json::from_slice(input).context("failed to parse checksum response")?;
        let checksums = document
            .get("checksums")
            .ok_or_else(|| anyhow!("checksum response has no 'checksums' field"))?;

        let table = match checksums {
            Value::Object(map) => match map.get(version) {
                Some(Value::Object(nested)) => nested,
                _ => map,
            },
            _ => {
                return Err(anyhow!(
                    "no checksums published for version '{version}' locale '{locale}'"
                ))
            }
        };

        let mut files = BTreeMap::new();
        for (path, hash) in table {
            if !is_relative_path(path) {
                continue;
            }
            let hash = hash
                .as_str()
                .ok_or_else(|| anyhow!("checksum for '{path}' is not a string"))?;
            files.insert(path.clone(), hash.to_ascii_lowercase());
        }

        Ok(Self::new(version, locale, files))
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries whose path stays inside the installation root.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .filter(|(path, _)| is_relative_path(path))
            .map(|(path, hash)| (path.as_str(), hash.as_str()))
    }

    /// Entries the updater ships verbatim: everything outside the mutable
    /// content directory.
    pub fn core_entries<'a>(
        &'a self,
        content_dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter()
            .filter(move |(path, _)| !is_content_path(path, content_dir))
    }
}

/// No leading separator, no drive letter, no `.` or `..` segment.
pub fn is_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with(['/', '\\']) {
        return false;
    }
    if path.as_bytes().get(1) == Some(&b':') {
        return false;
    }
    !path
        .split(['/', '\\'])
        .any(|segment| segment == ".." || segment == ".")
}

/// Plain prefix test, so `wp-content-old/x` also counts as content.
pub fn is_content_path(path: &str, content_dir: &str) -> bool {
    path.starts_with(content_dir)
}

/// Root-level `.html` / `.txt` files (readme, license) are rewritten by some
/// hosts and never gate an update.
pub fn is_root_document(path: &str) -> bool {
    if path.contains('/') {
        return false;
    }
    matches!(
        Path::new(path).extension().and_then(|ext| ext.to_str()),
        Some("html" | "txt")
    )
}
