use anyhow::{anyhow, Context, Result};
use pressup_core::CoreUpdateOffer;
use serde::Deserialize;
use tracing::debug;

use crate::download::HttpClient;
use crate::state::{OptionStore, UpdateCoreCache, UPDATE_CORE_OPTION};

pub struct VersionCheckClient<'a> {
    http: &'a dyn HttpClient,
    api_url: String,
}

impl<'a> VersionCheckClient<'a> {
    pub fn new(http: &'a dyn HttpClient, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, version: &str, locale: &str) -> String {
        format!(
            "{}/core/version-check/1.7/?version={version}&locale={locale}",
            self.api_url
        )
    }

    /// Offers for `version`, best first.
    pub fn check(&self, version: &str, locale: &str) -> Result<Vec<CoreUpdateOffer>> {
        let url = self.url_for(version, locale);
        let response = self.http.get(&url)?;
        if !response.is_success() {
            return Err(anyhow!(
                "version check at {url} failed with HTTP status {}",
                response.status
            ));
        }
        parse_offers(&response.body).with_context(|| format!("unusable version check response from {url}"))
    }

    /// Runs a check and stores the result in the `update_core` cache.
    pub fn refresh(
        &self,
        options: &OptionStore,
        version: &str,
        locale: &str,
        now: u64,
    ) -> Result<UpdateCoreCache> {
        let updates = self.check(version, locale)?;
        let cache = UpdateCoreCache {
            last_checked: now,
            version_checked: version.to_string(),
            updates,
        };
        options.set(UPDATE_CORE_OPTION, &cache)?;
        debug!(offers = cache.updates.len(), "version check cached");
        Ok(cache)
    }
}

/// Accepts `{"offers": [...]}` or a bare offer object.
pub fn parse_offers(body: &[u8]) -> Result<Vec<CoreUpdateOffer>> {
    #[derive(Deserialize)]
    struct Envelope {
        offers: Vec<CoreUpdateOffer>,
    }

    if let Ok(envelope) = serde_json::from_slice::<Envelope>(body) {
        if envelope.offers.is_empty() {
            return Err(anyhow!("version check response contained no offers"));
        }
        return Ok(envelope.offers);
    }
    let text = std::str::from_utf8(body).context("version check response is not UTF-8")?;
    Ok(vec![CoreUpdateOffer::from_json_str(text)?])
}

pub fn cached_updates(options: &OptionStore) -> Result<Option<UpdateCoreCache>> {
    options.get(UPDATE_CORE_OPTION)
}
