//! Datum grid acquisition.
//!
//! Grid bytes come from wherever the deployment keeps them; the
//! [`GridSource`] trait hides that behind one async call so the converter,
//! and the tests, never care about transport.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed future type used to keep [`GridSource`] object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure while obtaining grid bytes.
#[derive(Debug)]
pub struct GridSourceError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GridSourceError {
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

impl std::fmt::Display for GridSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GridSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Where the NTv2 grid bytes come from.
pub trait GridSource: Send + Sync {
    /// Location shown in logs and error messages.
    fn describe(&self) -> String;

    /// Fetches the raw grid file.
    fn fetch_grid(&self) -> BoxFuture<'_, Result<Vec<u8>, GridSourceError>>;
}

/// Fetches the grid over HTTP.
pub struct HttpGridSource {
    client: reqwest::Client,
    url: String,
}

impl HttpGridSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl GridSource for HttpGridSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch_grid(&self) -> BoxFuture<'_, Result<Vec<u8>, GridSourceError>> {
        Box::pin(async move {
            let response = self.client.get(&self.url).send().await.map_err(|e| {
                GridSourceError::with_source(format!("request to {} failed", self.url), e)
            })?;
            if !response.status().is_success() {
                return Err(GridSourceError::new(format!(
                    "HTTP error: {}",
                    response.status()
                )));
            }
            let bytes = response.bytes().await.map_err(|e| {
                GridSourceError::with_source("failed to read grid response body", e)
            })?;
            Ok(bytes.to_vec())
        })
    }
}

/// Reads the grid from a local file.
pub struct FileGridSource {
    path: PathBuf,
}

impl FileGridSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GridSource for FileGridSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch_grid(&self) -> BoxFuture<'_, Result<Vec<u8>, GridSourceError>> {
        Box::pin(async move {
            tokio::fs::read(&self.path).await.map_err(|e| {
                GridSourceError::with_source(format!("failed to read {}", self.path.display()), e)
            })
        })
    }
}
