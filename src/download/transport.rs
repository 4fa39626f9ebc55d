//! How an admitted attempt reaches the network.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use super::info::sha256_file;
use super::request::DownloadRequest;

/// Starts downloads and verifies their targets.
#[async_trait]
pub trait DownloadTransport: Send + Sync + std::fmt::Debug {
    /// Starts the transfer. Must return without waiting for it; the transfer
    /// is never cancelled once started.
    fn initiate(&self, request: &DownloadRequest);

    /// Lightweight existence check against the download target.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if the target is unreachable or missing.
    async fn verify(&self, request: &DownloadRequest) -> Result<(), DownloadError>;
}

/// HTTP transport: streams into an output directory on a detached task and
/// verifies with a `HEAD` probe.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    output_dir: Option<PathBuf>,
    expected_sha256: Option<String>,
    transfers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpTransport {
    /// Creates a transport. With no `output_dir` the transfer is left to the
    /// caller and only verification runs.
    #[must_use]
    pub fn new(client: HttpClient, output_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            output_dir,
            expected_sha256: None,
            transfers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Published checksum to compare completed downloads against.
    #[must_use]
    pub fn with_expected_sha256(mut self, sha256: Option<String>) -> Self {
        self.expected_sha256 = sha256.map(|s| s.to_ascii_lowercase());
        self
    }

    /// Waits for every transfer started so far. Clones share the same set.
    pub async fn wait_for_transfers(&self) {
        let transfers = match self.transfers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for transfer in transfers {
            if let Err(error) = transfer.await {
                warn!(error = %error, "background download task failed");
            }
        }
    }
}

#[async_trait]
impl DownloadTransport for HttpTransport {
    fn initiate(&self, request: &DownloadRequest) {
        let Some(output_dir) = self.output_dir.clone() else {
            debug!(source = request.source(), "download handed off without local transfer");
            return;
        };
        let client = self.client.clone();
        let url = request.url().clone();
        let expected = self.expected_sha256.clone();

        let transfer = tokio::spawn(async move {
            let path = match client.download_to_file(&url, &output_dir).await {
                Ok(path) => path,
                Err(error) => {
                    warn!(error = %error, "background download failed");
                    return;
                }
            };
            let Some(expected) = expected else {
                return;
            };
            match sha256_file(&path).await {
                Ok(actual) if actual == expected => {
                    info!(path = %path.display(), "checksum verified");
                }
                Ok(actual) => warn!(
                    path = %path.display(),
                    expected = %expected,
                    actual = %actual,
                    "checksum mismatch"
                ),
                Err(error) => warn!(error = %error, "could not checksum download"),
            }
        });
        if let Ok(mut transfers) = self.transfers.lock() {
            transfers.retain(|handle| !handle.is_finished());
            transfers.push(transfer);
        }
    }

    async fn verify(&self, request: &DownloadRequest) -> Result<(), DownloadError> {
        self.client.probe(request.url()).await
    }
}
