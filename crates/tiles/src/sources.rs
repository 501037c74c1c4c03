//! Page retrieval.
//!
//! The fetcher asks a [`PageSource`] for raw page bytes and never touches the
//! network itself, so tests can script page sequences, failures, and cycles
//! without a server.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future type used to keep [`PageSource`] object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure while obtaining a page body.
#[derive(Debug)]
pub struct PageSourceError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PageSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl std::fmt::Display for PageSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PageSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Delivers the raw body of one page URL.
pub trait PageSource: Send + Sync {
    fn fetch_page(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, PageSourceError>>;
}

/// Fetches pages over HTTP with a per-request timeout.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(request_timeout: Duration) -> Result<Self, PageSourceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PageSourceError::with_source("failed to build HTTP client", e))?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, PageSourceError>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self.client.get(&url).send().await.map_err(|e| {
                PageSourceError::with_source(format!("request to {url} failed"), e)
            })?;
            if !response.status().is_success() {
                return Err(PageSourceError::new(format!(
                    "HTTP error: {}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| PageSourceError::with_source("failed to read page body", e))?;
            Ok(bytes.to_vec())
        })
    }
}
