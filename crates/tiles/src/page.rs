//! Wire format of one feature page.
//!
//! The tile service answers bbox queries with JSON pages: the features
//! themselves, collection metadata, and a `links` list whose `rel == "next"`
//! entry points at the following page. Only the fields the aggregation needs
//! are kept; everything else on the page is ignored.

use citymodel::{CityJsonFeature, Transform};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturePage {
    #[serde(default)]
    pub features: Vec<CityJsonFeature>,
    #[serde(default)]
    pub metadata: Option<PageMetadata>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "numberMatched", default)]
    pub number_matched: Option<u64>,
    #[serde(rename = "numberReturned", default)]
    pub number_returned: Option<u64>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(rename = "referenceSystem", default)]
    pub reference_system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub rel: String,
}

impl FeaturePage {
    /// The next page's href, when the service advertises one.
    pub fn next_href(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "next")
            .map(|link| link.href.as_str())
    }
}
