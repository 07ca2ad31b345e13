use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageVariant {
    Full,
    Partial,
    Rollback,
    NoContent,
    NewBundled,
}

impl PackageVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Rollback => "rollback",
            Self::NoContent => "no_content",
            Self::NewBundled => "new_bundled",
        }
    }
}

impl fmt::Display for PackageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download URLs offered by the version-check service. The service reports
/// unavailable variants as `false`, so every slot tolerates falsy values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedPackages {
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub no_content: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub new_bundled: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
}

impl OfferedPackages {
    pub fn get(&self, variant: PackageVariant) -> Option<&str> {
        match variant {
            PackageVariant::Full => self.full.as_deref(),
            PackageVariant::Partial => self.partial.as_deref(),
            PackageVariant::Rollback => self.rollback.as_deref(),
            PackageVariant::NoContent => self.no_content.as_deref(),
            PackageVariant::NewBundled => self.new_bundled.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreUpdateOffer {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub packages: OfferedPackages,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub partial_version: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub new_bundled: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    #[serde(default, deserialize_with = "falsy_string", skip_serializing_if = "Option::is_none")]
    pub mysql_version: Option<String>,
}

impl CoreUpdateOffer {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse core update offer")
    }

    /// Accepts either a single offer or the service's `{"offers": [...]}`
    /// envelope, returning the first offer in the latter case.
    pub fn from_version_check_json(input: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            offers: Vec<CoreUpdateOffer>,
        }

        if let Ok(envelope) = serde_json::from_str::<Envelope>(input) {
            return envelope
                .offers
                .into_iter()
                .next()
                .context("version check response contained no offers");
        }
        Self::from_json_str(input)
    }

    pub fn is_latest(&self) -> bool {
        let response = self.response.trim();
        response.is_empty() || response == "latest"
    }

    pub fn is_reinstall(&self) -> bool {
        self.response.trim() == "reinstall"
    }
}

/// One candidate release package resolved from an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub locator: String,
    pub variant: PackageVariant,
    pub target_version: String,
}

fn falsy_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text),
        _ => None,
    })
}
