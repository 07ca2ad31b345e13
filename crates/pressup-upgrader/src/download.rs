use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use pressup_core::messages::{self, interpolate};
use pressup_core::{codes, ErrorData, UpgradeError};
use pressup_security::{sha256_hex, verify_package_signature, verify_sha256};
use tracing::{debug, warn};

/// Response header carrying the expected SHA-256 of the body.
pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";
pub const SIGNATURE_SUFFIX: &str = ".sig";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub trait HttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse>;

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpResponse>;
}

/// Blocking reqwest client used outside tests.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pressup/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url} failed"))?;
        into_response(response, url)
    }

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .with_context(|| format!("POST {url} failed"))?;
        into_response(response, url)
    }
}

fn into_response(response: reqwest::blocking::Response, url: &str) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();
    let body = response
        .bytes()
        .with_context(|| format!("failed reading response body from {url}"))?
        .to_vec();
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Trusted ed25519 keys for package signatures. With no keys configured
/// packages are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePolicy {
    pub trusted_keys: Vec<String>,
    pub required: bool,
}

impl SignaturePolicy {
    pub fn is_enabled(&self) -> bool {
        !self.trusted_keys.is_empty()
    }
}

pub fn is_remote(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Fetches `url` into a fresh `.tmp` file under `dir`.
pub fn download_to_temp(
    http: &dyn HttpClient,
    url: &str,
    dir: &Path,
    signatures: &SignaturePolicy,
) -> Result<PathBuf, UpgradeError> {
    let response = http
        .get(url)
        .map_err(|err| download_failed(format!("{err:#}")))?;
    if !response.is_success() {
        return Err(download_failed(format!("HTTP status {}", response.status)));
    }

    if let Some(expected) = response.header(CHECKSUM_HEADER) {
        if !verify_sha256(&response.body, expected) {
            return Err(download_failed(format!(
                "checksum mismatch: expected {}, got {}",
                expected.trim(),
                sha256_hex(&response.body)
            )));
        }
    }

    if signatures.is_enabled() {
        if let Err(err) = check_signature(http, url, &response.body, signatures) {
            if signatures.required {
                return Err(err);
            }
            warn!(code = err.code(), "{}", err.message());
        }
    }

    write_temp_file(dir, url, &response.body).map_err(|err| download_failed(format!("{err:#}")))
}

fn check_signature(
    http: &dyn HttpClient,
    url: &str,
    payload: &[u8],
    policy: &SignaturePolicy,
) -> Result<(), UpgradeError> {
    let name = file_name_of(url);
    let signatures = http
        .get(&format!("{url}{SIGNATURE_SUFFIX}"))
        .ok()
        .filter(HttpResponse::is_success)
        .map(|response| {
            String::from_utf8_lossy(&response.body)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if signatures.is_empty() {
        return Err(UpgradeError::new(
            codes::SIGNATURE_NO_SIGNATURE,
            interpolate(messages::SIGNATURE_NO_SIGNATURE, &[name.as_str()]),
        ));
    }

    match verify_package_signature(payload, &policy.trusted_keys, &signatures) {
        Some(index) => {
            debug!(package = %name, key_index = index, "package signature verified");
            Ok(())
        }
        None => Err(UpgradeError::new(
            codes::SIGNATURE_FAILED,
            interpolate(messages::SIGNATURE_FAILED, &[name.as_str()]),
        )
        .with_data(ErrorData::Paths(signatures))),
    }
}

fn write_temp_file(dir: &Path, url: &str, body: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let stem = file_name_of(url);
    let stem = stem
        .strip_suffix(".zip")
        .unwrap_or(&stem)
        .trim_matches('.')
        .to_string();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    let stem = if stem.is_empty() { "package".to_string() } else { stem };
    let path = dir.join(format!("{stem}-{nanos:08x}.tmp"));
    let part = path.with_extension("tmp.part");

    if let Err(err) = fs::write(&part, body) {
        let _ = fs::remove_file(&part);
        return Err(err).with_context(|| format!("failed to write {}", part.display()));
    }
    fs::rename(&part, &path)
        .with_context(|| format!("failed to move download into place: {}", path.display()))?;
    Ok(path)
}

fn file_name_of(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

fn download_failed(detail: String) -> UpgradeError {
    UpgradeError::new(codes::DOWNLOAD_FAILED, messages::DOWNLOAD_FAILED)
        .with_data(ErrorData::Text(detail))
}
