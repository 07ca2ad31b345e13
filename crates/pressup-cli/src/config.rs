use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pressup_core::UpgradeManifests;
use pressup_upgrader::{
    AutoUpdatePolicy, AutoUpdateSetting, InstallLayout, ServerEnvironment, SignaturePolicy,
    UpgradeSettings, DEFAULT_CONTENT_DIR,
};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "pressup.toml";
pub const DEFAULT_API_URL: &str = "https://api-v1.classicpress.net";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressupConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub languages_dir: Option<PathBuf>,
    /// Transport identifier; detected from file ownership when unset.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default = "default_fallback_method")]
    pub fallback_method: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub report_stats: bool,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub skip_new_bundled: bool,
    #[serde(default)]
    pub auto_update: Option<AutoUpdateSetting>,
    /// Replaces the built-in obsolete-file and bundled-item lists.
    #[serde(default)]
    pub manifests: Option<PathBuf>,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub signatures: SignatureConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default = "default_php_version")]
    pub php_version: String,
    #[serde(default = "default_mysql_version")]
    pub mysql_version: String,
    #[serde(default = "default_php_extensions")]
    pub php_extensions: Vec<String>,
    #[serde(default = "default_enabled")]
    pub is_mysql: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfig {
    #[serde(default)]
    pub trusted_keys: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            php_version: default_php_version(),
            mysql_version: default_mysql_version(),
            php_extensions: default_php_extensions(),
            is_mysql: default_enabled(),
        }
    }
}

impl Default for PressupConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            content_dir: default_content_dir(),
            state_dir: None,
            languages_dir: None,
            method: None,
            fallback_method: default_fallback_method(),
            locale: default_locale(),
            api_url: default_api_url(),
            http_timeout_secs: default_http_timeout_secs(),
            report_stats: default_enabled(),
            background: false,
            skip_new_bundled: false,
            auto_update: None,
            manifests: None,
            environment: EnvironmentConfig::default(),
            signatures: SignatureConfig::default(),
        }
    }
}

impl PressupConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(content).context("failed parsing pressup config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let mut config =
            Self::parse(&content).with_context(|| format!("invalid config: {}", path.display()))?;
        if config.root.is_relative() {
            if let Some(parent) = path.parent() {
                config.root = parent.join(&config.root);
            }
        }
        Ok(config)
    }

    /// An explicit `--config` must exist; the implicit `pressup.toml` is
    /// optional. `--root` wins over the file.
    pub fn load_for_cli(config_path: Option<&Path>, root: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        if let Some(root) = root {
            config.root = root.to_path_buf();
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.content_dir.trim().is_empty() || self.content_dir.contains(['/', '\\']) {
            return Err(anyhow!(
                "content_dir must be a single directory name, got '{}'",
                self.content_dir
            ));
        }
        if self.locale.trim().is_empty() {
            return Err(anyhow!("locale must not be empty"));
        }
        if self.signatures.required && self.signatures.trusted_keys.is_empty() {
            return Err(anyhow!(
                "signatures.required is set but no signatures.trusted_keys are configured"
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> InstallLayout {
        let mut layout =
            InstallLayout::new(&self.root).with_content_dir_name(self.content_dir.clone());
        if let Some(state_dir) = &self.state_dir {
            layout = layout.with_state_dir(state_dir);
        }
        if let Some(languages_dir) = &self.languages_dir {
            layout = layout.with_languages_dir(languages_dir);
        }
        layout
    }

    pub fn environment(&self) -> ServerEnvironment {
        let mut environment = ServerEnvironment::new(
            self.environment.php_version.clone(),
            self.environment.mysql_version.clone(),
        );
        environment.php_extensions = self.environment.php_extensions.clone();
        environment.is_mysql = self.environment.is_mysql;
        environment
    }

    pub fn settings(&self) -> UpgradeSettings {
        UpgradeSettings {
            locale: self.locale.clone(),
            skip_new_bundled: self.skip_new_bundled,
            background: self.background,
            signatures: SignaturePolicy {
                trusted_keys: self.signatures.trusted_keys.clone(),
                required: self.signatures.required,
            },
        }
    }

    pub fn auto_update_policy(&self) -> AutoUpdatePolicy {
        AutoUpdatePolicy::from_setting(self.auto_update)
    }

    pub fn manifests(&self) -> Result<UpgradeManifests> {
        let Some(path) = &self.manifests else {
            return Ok(UpgradeManifests::builtin());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading manifests: {}", path.display()))?;
        UpgradeManifests::from_toml_str(&content)
            .with_context(|| format!("invalid manifests: {}", path.display()))
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_content_dir() -> String {
    DEFAULT_CONTENT_DIR.to_string()
}

fn default_fallback_method() -> String {
    "ftpext".to_string()
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

fn default_php_version() -> String {
    "8.1.0".to_string()
}

fn default_mysql_version() -> String {
    "8.0.0".to_string()
}

fn default_php_extensions() -> Vec<String> {
    vec!["json".to_string()]
}
