//! Display-only download metadata.
//!
//! `download-info.json` and `checksums.txt` populate version, size and
//! checksum fields around the download controls. Both are optional: a
//! missing or broken resource is logged and treated as absent, and neither
//! ever influences a gate decision.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::error::DownloadError;

/// Site-relative path of the metadata resource.
pub const DOWNLOAD_INFO_PATH: &str = "/download/download-info.json";

/// Site-relative path of the checksums resource.
pub const CHECKSUMS_PATH: &str = "/download/checksums.txt";

/// Published checksums of the current build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoChecksums {
    /// Lowercase hex SHA-256 of the download.
    pub sha256: Option<String>,
}

/// Minimum system requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Requirements {
    pub min_memory: Option<String>,
    pub min_disk: Option<String>,
}

/// Contents of `download-info.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadInfo {
    /// Human-readable size; numbers are accepted and rendered as text.
    #[serde(deserialize_with = "string_or_number")]
    pub size: Option<String>,
    pub version: Option<String>,
    pub download_count: Option<u64>,
    pub last_updated: Option<String>,
    pub checksums: InfoChecksums,
    pub compatibility: Vec<String>,
    pub requirements: Requirements,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

/// Parsed `checksums.txt` in `sha256sum` format (`<hex>  <file>` per line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    entries: Vec<(String, String)>,
}

impl Checksums {
    /// Parses checksum lines, skipping comments and lines in other formats.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (hash, file) = line.split_once(char::is_whitespace)?;
                let file = file.trim_start().trim_start_matches('*');
                let valid = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
                (valid && !file.is_empty())
                    .then(|| (file.to_string(), hash.to_ascii_lowercase()))
            })
            .collect();
        Self { entries }
    }

    /// SHA-256 published for `file`, if listed.
    #[must_use]
    pub fn sha256_for(&self, file: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == file)
            .map(|(_, hash)| hash.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves a published resource path against the site base.
fn resource_url(site: &Url, path: &str) -> Result<Url, DownloadError> {
    site.join(path)
        .map_err(|_| DownloadError::invalid_url(format!("{site}{path}")))
}

/// Loads `download-info.json` relative to `site`. Failures yield `None`.
#[instrument(skip(client), fields(site = %site))]
pub async fn load_download_info(client: &HttpClient, site: &Url) -> Option<DownloadInfo> {
    let url = resource_url(site, DOWNLOAD_INFO_PATH)
        .map_err(|error| warn!(error = %error, "download info location invalid"))
        .ok()?;
    match client.fetch_json::<DownloadInfo>(&url).await {
        Ok(Some(info)) => {
            debug!(version = ?info.version, "download info loaded");
            Some(info)
        }
        Ok(None) => {
            debug!("download info not published");
            None
        }
        Err(error) => {
            warn!(error = %error, "failed to load download info");
            None
        }
    }
}

/// Loads `checksums.txt` relative to `site`. Failures yield `None`.
#[instrument(skip(client), fields(site = %site))]
pub async fn load_checksums(client: &HttpClient, site: &Url) -> Option<Checksums> {
    let url = resource_url(site, CHECKSUMS_PATH)
        .map_err(|error| warn!(error = %error, "checksums location invalid"))
        .ok()?;
    match client.fetch_text(&url).await {
        Ok(Some(text)) => Some(Checksums::parse(&text)),
        Ok(None) => None,
        Err(error) => {
            warn!(error = %error, "failed to load checksums");
            None
        }
    }
}

/// Computes the lowercase hex SHA-256 of a file.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
