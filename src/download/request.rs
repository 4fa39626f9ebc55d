//! Download URL construction.

use url::Url;

use crate::token::DownloadToken;

/// A tokenized request for the download target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: Url,
    source: String,
}

impl DownloadRequest {
    /// Appends `token`, `venture`, `version` and `t` (token issue time) to
    /// `base`, keeping any query parameters already present.
    #[must_use]
    pub fn build(
        base: &Url,
        token: &DownloadToken,
        venture: &str,
        version: &str,
        source: impl Into<String>,
    ) -> Self {
        let mut url = base.clone();
        url.query_pairs_mut()
            .append_pair("token", token.as_str())
            .append_pair("venture", venture)
            .append_pair("version", version)
            .append_pair("t", &token.issued_at_ms().to_string());
        Self {
            url,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Tag of the control that started the attempt.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}
