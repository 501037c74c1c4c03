//! Sequential page aggregation.
//!
//! Starting from a bbox query against the configured collection endpoint,
//! the fetcher follows `rel == "next"` links until the service stops
//! advertising one, accumulating every returned feature. The page limit
//! bounds the walk even against a cyclic link chain; hitting it is
//! recoverable and returns what was collected. Every other page failure
//! aborts the whole aggregation, discarding partial results.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use citymodel::{FeatureCollection, Transform};
use geodesy::BoundingBox;
use reqwest::Url;
use tracing::{info, warn};

use crate::page::FeaturePage;
use crate::sources::PageSource;

/// How an aggregation run talks to the service.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Feature collection endpoint the bbox query is issued against.
    pub base_url: String,
    /// `limit` query parameter sent with the first request.
    pub page_size: usize,
    /// Upper bound on pages fetched in one aggregation.
    pub page_limit: usize,
    /// Pause between successive page requests.
    pub page_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.3dbag.nl/collections/pand/items".to_string(),
            page_size: 100,
            page_limit: 20,
            page_delay: Duration::from_millis(100),
        }
    }
}

/// Shared flag for aborting an aggregation between page requests.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An aggregation run failed; no partial collection is returned.
#[derive(Debug)]
pub enum FetchError {
    /// Transport failure, non-success status, undecodable body, or an
    /// unresolvable page URL. Page numbering starts at 1.
    PageFetchFailed {
        page: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The first page carried no transform to anchor the collection on.
    MissingTransform,
    /// A later page's transform disagrees with the first page's.
    InconsistentTransform {
        page: usize,
        expected: Transform,
        found: Transform,
    },
    /// The cancel flag was raised between page requests.
    Cancelled { page: usize },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::PageFetchFailed { page, source } => {
                write!(f, "page {page} could not be fetched: {source}")
            }
            FetchError::MissingTransform => {
                write!(f, "first page carries no metadata.transform")
            }
            FetchError::InconsistentTransform {
                page,
                expected,
                found,
            } => {
                write!(
                    f,
                    "page {page} transform {found:?} does not match the first page's {expected:?}"
                )
            }
            FetchError::Cancelled { page } => {
                write!(f, "aggregation cancelled before page {page}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::PageFetchFailed { source, .. } => Some(source.as_ref() as _),
            _ => None,
        }
    }
}

/// Walks a bbox query's page chain and returns the combined collection.
pub struct TileFetcher {
    source: Box<dyn PageSource>,
    config: FetchConfig,
}

impl TileFetcher {
    pub fn new(source: Box<dyn PageSource>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    /// Fetches every page for `bbox`, strictly sequentially.
    ///
    /// The first page must carry the collection metadata; its transform
    /// anchors the whole collection and later pages may not contradict it.
    pub async fn fetch_all_pages(
        &self,
        bbox: BoundingBox,
        cancel: &CancelFlag,
    ) -> Result<FeatureCollection, FetchError> {
        let mut page = 1usize;
        let mut url = self.first_page_url(bbox)?;
        let mut features = Vec::new();
        let mut transform: Option<Transform> = None;
        let mut version = None;
        let mut reference_system = None;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { page });
            }

            let body = self
                .source
                .fetch_page(url.as_str())
                .await
                .map_err(|e| FetchError::PageFetchFailed {
                    page,
                    source: Box::new(e),
                })?;
            let decoded: FeaturePage =
                serde_json::from_slice(&body).map_err(|e| FetchError::PageFetchFailed {
                    page,
                    source: Box::new(e),
                })?;
            info!(
                page,
                url = %url,
                features = decoded.features.len(),
                matched = ?decoded.number_matched,
                "fetched feature page"
            );

            let page_transform = decoded.metadata.as_ref().and_then(|m| m.transform);
            match (transform, page_transform) {
                (None, Some(found)) => {
                    transform = Some(found);
                    version = decoded.version.clone();
                    reference_system = decoded
                        .metadata
                        .as_ref()
                        .and_then(|m| m.reference_system.clone());
                }
                (None, None) => return Err(FetchError::MissingTransform),
                (Some(expected), Some(found)) => {
                    if found != expected {
                        return Err(FetchError::InconsistentTransform {
                            page,
                            expected,
                            found,
                        });
                    }
                }
                (Some(_), None) => {}
            }

            let next_href = decoded.next_href().map(str::to_string);
            features.extend(decoded.features);

            let Some(href) = next_href else {
                break;
            };
            if page >= self.config.page_limit {
                warn!(
                    limit = self.config.page_limit,
                    "page limit reached, stopping with the features collected so far"
                );
                break;
            }

            // Hrefs are usually absolute paths; resolving against the page's
            // own URL keeps the service origin.
            url = url.join(&href).map_err(|e| FetchError::PageFetchFailed {
                page: page + 1,
                source: Box::new(e),
            })?;
            page += 1;

            if !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }

        info!(pages = page, features = features.len(), "aggregation complete");
        let Some(transform) = transform else {
            return Err(FetchError::MissingTransform);
        };
        Ok(FeatureCollection {
            features,
            transform,
            version,
            reference_system,
        })
    }

    fn first_page_url(&self, bbox: BoundingBox) -> Result<Url, FetchError> {
        let url = format!(
            "{}?bbox={}&limit={}",
            self.config.base_url, bbox, self.config.page_size
        );
        Url::parse(&url).map_err(|e| FetchError::PageFetchFailed {
            page: 1,
            source: Box::new(e),
        })
    }
}
