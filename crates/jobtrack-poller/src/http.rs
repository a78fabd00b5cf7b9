//! HTTP status endpoint fetcher
//!
//! GETs a status URL returning `{ "status": ..., "data"?: ..., "error"?: ... }`.

use crate::fetcher::{FetchError, StatusFetcher, StatusReport};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fetcher for one job's status URL
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpStatusFetcher {
    /// Create a fetcher with its own client
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Create a fetcher sharing an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: None,
        }
    }

    /// With a per-request deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Status URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self) -> Result<StatusReport, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<StatusReport>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch_status(&self, cancel: CancellationToken) -> Result<StatusReport, FetchError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.request() => result,
        }
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}
