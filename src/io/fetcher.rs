use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// One attempt handed to the raw fetch primitive.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Fully built URL, including query parameters
    pub url: String,

    /// Request headers (authorization etc.)
    pub headers: HeaderMap,

    /// Token of the logical call; implementations should abort when it fires
    pub cancel: CancellationToken,
}

/// A completed HTTP response. The status is not interpreted.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status_text: Option<String>,
}

impl FetchResponse {
    /// Response with an empty header map.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Status in the 0-299 range.
    pub fn is_success(&self) -> bool {
        self.status < 300
    }

    /// Human-readable reason for a failed response.
    ///
    /// Taken from the body's `statusText` field when the body is JSON and
    /// carries one, otherwise the canonical reason phrase of the status.
    pub fn status_text(&self) -> String {
        if let Ok(StatusBody {
            status_text: Some(text),
        }) = serde_json::from_slice::<StatusBody>(&self.body)
        {
            return text;
        }
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", self.status))
    }

    /// Turn a non-success response into [`FetchError::Http`].
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Http {
                status: self.status,
                message: self.status_text(),
            })
        }
    }
}

/// Raw asynchronous HTTP GET primitive.
///
/// This is the seam between the download layer and the network. It performs
/// exactly one attempt and returns whatever status the server sent; retries,
/// concurrency limits and status interpretation live above it.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`HttpFetcher`] backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with a request timeout.
    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let FetchRequest {
            url,
            headers,
            cancel,
        } = request;

        let attempt = async {
            let response = self
                .client
                .get(&url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| FetchError::Transport(format!("Request to {url} failed: {e}")))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(format!("Failed to read response: {e}")))?;

            Ok(FetchResponse {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = attempt => result,
        }
    }
}
