//! HTTP client for download targets and their metadata.
//!
//! Wraps a single pooled `reqwest` client and provides the four requests the
//! gatekeeper needs: an existence probe, a streamed download, and best-effort
//! JSON and text fetches for display metadata.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::{filename_from_url, resolve_unique_path};
use crate::user_agent;

/// HTTP client for download and metadata requests.
///
/// Create once and reuse; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use download_gate::download::HttpClient;
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// client.probe(&Url::parse("https://example.com/app.zip")?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts (30 s connect, 5 min read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(user_agent::default_download_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Lightweight existence check against a download target.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::HttpStatus`] for non-success responses and
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] for transport
    /// failures.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &Url) -> Result<(), DownloadError> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "probe failed");
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        debug!("probe succeeded");
        Ok(())
    }

    /// Streams `url` into `output_dir`, returning the written path.
    ///
    /// The filename is the last URL path segment; an existing file is never
    /// overwritten (a numeric suffix is added instead).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on HTTP, transport, or file system failure.
    #[instrument(skip(self, output_dir), fields(url = %url))]
    pub async fn download_to_file(
        &self,
        url: &Url,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;
        let path = resolve_unique_path(output_dir, &filename_from_url(url));
        let mut file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;

        let bytes_written = match stream_to_file(&mut file, response, url, &path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                drop(file);
                debug!(path = %path.display(), "removing partial file after error");
                if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %remove_error, "could not remove partial file");
                }
                return Err(error);
            }
        };

        info!(path = %path.display(), bytes = bytes_written, "download written");
        Ok(path)
    }

    /// Fetches and decodes a JSON resource. A 404 yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on other HTTP failures, transport failures,
    /// or an undecodable body.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
    ) -> Result<Option<T>, DownloadError> {
        let Some(body) = self.fetch_text(url).await? else {
            return Ok(None);
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| DownloadError::malformed(url.as_str(), e.to_string()))
    }

    /// Fetches a text resource. A 404 yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on other HTTP failures or transport failures.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &Url) -> Result<Option<String>, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("resource absent");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        response
            .text()
            .await
            .map(Some)
            .map_err(|e| DownloadError::network(url.as_str(), e))
    }
}

/// Streams the response body into `file`, returning the bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &Url,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::network(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}
