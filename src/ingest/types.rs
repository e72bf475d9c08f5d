// src/ingest/types.rs
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A normalized candidate from any source. `link` is the dedup key: two
/// items with the same link are the same item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub link: String,
    /// Plain text, HTML already stripped.
    pub content: String,
    /// Human-readable origin, e.g. the feed name or the subreddit.
    pub source: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub score: Option<i64>,
    pub comments: Option<u64>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_crosspost: bool,
    pub target_url: Option<String>,
    pub target_domain: Option<String>,
    pub flair: Option<String>,
}

impl Item {
    /// Minimal item with just the fields every source provides.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

/// Listing order requested from a forum.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingSort {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl ListingSort {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingSort::Hot => "hot",
            ListingSort::New => "new",
            ListingSort::Top => "top",
            ListingSort::Rising => "rising",
        }
    }
}

fn default_fetch_limit() -> usize {
    1
}

fn default_top_period() -> String {
    "day".to_string()
}

/// One configured source. Feeds use `url`; forums use `name` plus the
/// listing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sort: ListingSort,
    #[serde(default = "default_top_period")]
    pub top_period: String,
    /// How many posts to keep from one listing.
    #[serde(default = "default_fetch_limit")]
    pub limit: usize,
}

impl Source {
    pub fn feed(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            sort: ListingSort::Hot,
            top_period: default_top_period(),
            limit: default_fetch_limit(),
        }
    }

    pub fn forum(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            sort: ListingSort::Hot,
            top_period: default_top_period(),
            limit: default_fetch_limit(),
        }
    }

    /// Name used in logs and on items; falls back to the URL.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.url.as_deref().unwrap_or_default()
        } else {
            &self.name
        }
    }
}

/// Fetch adapter for one kind of source. Implementations do the HTTP and
/// parsing; the poller only sees normalized items or an error.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>, FetchError>;
    fn name(&self) -> &'static str;
}
