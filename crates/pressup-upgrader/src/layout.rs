use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONTENT_DIR: &str = "wp-content";
pub const VERSION_FILE: &str = "wp-includes/version.php";
pub const MANIFEST_FILE: &str = "readme.html";
pub const UPDATE_CORE_FILE: &str = "wp-admin/includes/update-core.php";
pub const MAINTENANCE_FILE: &str = ".maintenance";

/// Paths of one installation. Everything the upgrader touches is derived
/// from the root, the content directory name and the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
    content_dir_name: String,
    languages_dir: Option<PathBuf>,
    state_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(DEFAULT_CONTENT_DIR).join("pressup");
        Self {
            root,
            content_dir_name: DEFAULT_CONTENT_DIR.to_string(),
            languages_dir: None,
            state_dir,
        }
    }

    pub fn with_content_dir_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.state_dir == self.content_dir().join("pressup") {
            self.state_dir = self.root.join(&name).join("pressup");
        }
        self.content_dir_name = name;
        self
    }

    pub fn with_languages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.languages_dir = Some(dir.into());
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_dir_name(&self) -> &str {
        &self.content_dir_name
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(&self.content_dir_name)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.content_dir().join("plugins")
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.content_dir().join("themes")
    }

    /// The configured language directory, or `<content>/languages`.
    pub fn languages_dir(&self) -> PathBuf {
        self.languages_dir
            .clone()
            .unwrap_or_else(|| self.content_dir().join("languages"))
    }

    pub fn upgrade_dir(&self) -> PathBuf {
        self.content_dir().join("upgrade")
    }

    pub fn version_current_path(&self) -> PathBuf {
        self.upgrade_dir().join("version-current.php")
    }

    pub fn maintenance_path(&self) -> PathBuf {
        self.root.join(MAINTENANCE_FILE)
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }

    pub fn update_core_file(&self) -> PathBuf {
        self.root.join(UPDATE_CORE_FILE)
    }

    pub fn db_dropin_path(&self) -> PathBuf {
        self.content_dir().join("db.php")
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn options_dir(&self) -> PathBuf {
        self.state_dir.join("options")
    }

    pub fn option_path(&self, name: &str) -> PathBuf {
        self.options_dir().join(format!("{name}.json"))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.state_dir.join("tmp")
    }

    /// Resolves a path relative to the installation root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Strips the installation root, for error data shown to operators.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn ensure_state_dirs(&self) -> Result<()> {
        for dir in [self.options_dir(), self.locks_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
