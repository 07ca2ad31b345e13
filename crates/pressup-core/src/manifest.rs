use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::checksums::is_relative_path;

/// Values read from a release's version file (`wp-includes/version.php`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub version: String,
    pub wp_version: Option<String>,
    pub required_php_version: Option<String>,
    pub required_mysql_version: Option<String>,
}

impl VersionManifest {
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        let mut assignments = parse_php_assignments(source);
        let wp_version = assignments.remove("wp_version");
        let version = assignments
            .remove("cp_version")
            .or_else(|| wp_version.clone())
            .ok_or_else(|| anyhow!("version file declares neither $cp_version nor $wp_version"))?;

        Ok(Self {
            version,
            wp_version,
            required_php_version: assignments.remove("required_php_version"),
            required_mysql_version: assignments.remove("required_mysql_version"),
        })
    }
}

/// Collects `$name = 'value';` assignments. Anything else in the file is
/// ignored; the file is never executed.
fn parse_php_assignments(source: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in source.lines().map(str::trim) {
        let Some(rest) = line.strip_prefix('$') else {
            continue;
        };
        let Some((name, value)) = rest.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            continue;
        }

        let value = value.trim().trim_end_matches(';').trim();
        let unquoted = value
            .strip_prefix('\'')
            .and_then(|inner| inner.strip_suffix('\''))
            .or_else(|| {
                value
                    .strip_prefix('"')
                    .and_then(|inner| inner.strip_suffix('"'))
            });
        if let Some(unquoted) = unquoted {
            values.insert(name.to_string(), unquoted.to_string());
        } else if value.chars().all(|ch| ch.is_ascii_digit()) && !value.is_empty() {
            values.insert(name.to_string(), value.to_string());
        }
    }
    values
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundledKind {
    Plugins,
    Themes,
}

impl BundledKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plugins => "plugins",
            Self::Themes => "themes",
        }
    }
}

/// A plugin or theme shipped with a release that is installed only when it
/// appeared after the previously installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledItem {
    /// `plugins/<name>` or `themes/<name>`, relative to the content
    /// directory; a trailing slash marks a directory.
    pub path: String,
    pub introduced: String,
}

impl BundledItem {
    pub fn new(path: impl Into<String>, introduced: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            introduced: introduced.into(),
        }
    }

    pub fn kind(&self) -> Option<BundledKind> {
        match self.path.split_once('/')?.0 {
            "plugins" => Some(BundledKind::Plugins),
            "themes" => Some(BundledKind::Themes),
            _ => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Entry name inside the plugins or themes directory.
    pub fn name(&self) -> &str {
        self.path
            .split_once('/')
            .map(|(_, name)| name.trim_end_matches('/'))
            .unwrap_or_default()
    }
}

/// A file of a previously vendored library. Entries with a symbol are loaded
/// by name before removal; unkeyed entries are loaded by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendoredFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub path: String,
}

/// Version-pinned lists the core updater consumes as plain data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeManifests {
    #[serde(default)]
    pub old_files: Vec<String>,
    #[serde(default)]
    pub old_vendored_files: Vec<VendoredFile>,
    #[serde(default)]
    pub new_bundled: Vec<BundledItem>,
}

impl UpgradeManifests {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let manifests: Self =
            toml::from_str(input).context("failed to parse upgrade manifests")?;
        for item in &manifests.new_bundled {
            if item.kind().is_none() || item.name().is_empty() {
                return Err(anyhow!(
                    "bundled item '{}' must live under plugins/ or themes/",
                    item.path
                ));
            }
        }
        for file in manifests
            .old_files
            .iter()
            .chain(manifests.old_vendored_files.iter().map(|file| &file.path))
        {
            if !is_relative_path(file) {
                return Err(anyhow!("obsolete file path '{file}' must stay inside the root"));
            }
        }
        Ok(manifests)
    }

    /// Lists shipped with this release of the updater.
    pub fn builtin() -> Self {
        let old_files = [
            "wp-admin/import-b2.php",
            "wp-admin/import-blogger.php",
            "wp-admin/import-greymatter.php",
            "wp-admin/upgrade-schema.php",
            "wp-admin/css/upgrade.css",
            "wp-admin/js/cat.js",
            "wp-admin/js/page.js",
            "wp-includes/rss-functions.php",
            "wp-includes/js/tinymce/wp-tinymce.js.gz",
            "wp-includes/js/tinymce/plugins/wpeditimage/editimage.html",
            "wp-includes/random_compat/random_bytes_openssl.php",
        ];
        let vendored = [
            (Some("Requests_Exception_HTTP_304"), "wp-includes/Requests/Exception/HTTP/304.php"),
            (Some("Requests_Exception_HTTP_404"), "wp-includes/Requests/Exception/HTTP/404.php"),
            (Some("Requests_Hooker"), "wp-includes/Requests/Hooker.php"),
            (Some("Requests_Transport"), "wp-includes/Requests/Transport.php"),
            (None, "wp-includes/Requests/Utility/FilteredIterator.php"),
        ];

        Self {
            old_files: old_files.iter().map(|path| (*path).to_string()).collect(),
            old_vendored_files: vendored
                .iter()
                .map(|(symbol, path)| VendoredFile {
                    symbol: symbol.map(str::to_string),
                    path: (*path).to_string(),
                })
                .collect(),
            new_bundled: vec![
                BundledItem::new("themes/twentyseventeen/", "1.0.0"),
                BundledItem::new("plugins/classicpress-directory-integration/", "2.0.0"),
            ],
        }
    }

    /// Every obsolete path, vendored files included.
    pub fn all_old_files(&self) -> impl Iterator<Item = &str> {
        self.old_files
            .iter()
            .map(String::as_str)
            .chain(self.old_vendored_files.iter().map(|file| file.path.as_str()))
    }
}
