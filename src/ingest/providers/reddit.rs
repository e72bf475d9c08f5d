// src/ingest/providers/reddit.rs
use async_trait::async_trait;
use chrono::DateTime;
use rand::Rng;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{Item, ListingSort, Source, SourceFetcher};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    permalink: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    crosspost_parent_list: Vec<CrosspostParent>,
    link_flair_text: Option<String>,
    thumbnail: Option<String>,
    created_utc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CrosspostParent {
    permalink: String,
    subreddit: String,
}

/// Parse one listing page into at most `limit` items for `subreddit`.
/// Stickied and pinned posts are skipped before the limit applies.
pub fn parse_listing(
    body: &str,
    base_url: &str,
    subreddit: &str,
    limit: usize,
) -> Result<Vec<Item>, serde_json::Error> {
    let listing: Listing = serde_json::from_str(body)?;
    let base = base_url.trim_end_matches('/');

    let items = listing
        .data
        .children
        .into_iter()
        .map(|c| c.data)
        .filter(|p| !p.stickied && !p.pinned)
        .take(limit)
        .map(|p| {
            let (is_crosspost, target_url, target_domain) = match p.crosspost_parent_list.first() {
                Some(parent) => (
                    true,
                    format!("{base}{}", parent.permalink),
                    format!("r/{}", parent.subreddit),
                ),
                None => (false, p.url.clone(), p.domain.clone()),
            };

            let lower_url = p.url.to_ascii_lowercase();
            let image_url = IMAGE_EXTENSIONS
                .iter()
                .any(|ext| lower_url.ends_with(ext))
                .then(|| p.url.clone());

            let thumbnail_url = p
                .thumbnail
                .as_deref()
                .filter(|t| t.starts_with("http"))
                .map(|t| html_escape::decode_html_entities(t).to_string());

            let mut item = Item::new(
                p.id,
                html_escape::decode_html_entities(&p.title).to_string(),
                format!("{base}{}", p.permalink),
                subreddit,
            );
            item.content = normalize_text(&p.selftext);
            item.published_at = p
                .created_utc
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
                .map(|ts| ts.fixed_offset());
            item.score = Some(p.ups);
            item.comments = Some(p.num_comments);
            item.image_url = image_url;
            item.thumbnail_url = thumbnail_url;
            item.is_crosspost = is_crosspost;
            item.target_url = Some(target_url);
            item.target_domain = Some(target_domain);
            item.flair = p.link_flair_text.filter(|f| !f.trim().is_empty());
            item
        })
        .collect();
    Ok(items)
}

/// Forum fetcher for Reddit's public JSON listings.
pub struct RedditFetcher {
    client: reqwest::Client,
    base_url: String,
    ua_version: AtomicU32,
}

impl RedditFetcher {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            ua_version: AtomicU32::new(rand::rng().random_range(0..=4)),
        }
    }

    /// Firefox-like user agent; the version re-rolls roughly once per 2000 calls.
    fn user_agent(&self) -> String {
        let mut rng = rand::rng();
        if rng.random_range(1..=2000) == 1 {
            self.ua_version
                .store(rng.random_range(0..=4), Ordering::Relaxed);
        }
        let version = 130 + self.ua_version.load(Ordering::Relaxed);
        format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"
        )
    }

    fn listing_url(&self, source: &Source) -> String {
        let base = self.base_url.trim_end_matches('/');
        let mut url = format!("{base}/r/{}/{}.json", source.name, source.sort.as_str());
        if source.sort == ListingSort::Top {
            url.push_str("?t=");
            url.push_str(&source.top_period);
        }
        url
    }
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>, FetchError> {
        let url = self.listing_url(source);
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.clone(),
                source: e,
            })?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await.map_err(|e| FetchError::Http {
            url: url.clone(),
            source: e,
        })?;
        parse_listing(&body, &self.base_url, &source.name, source.limit).map_err(|e| {
            FetchError::Parse {
                url,
                reason: e.to_string(),
            }
        })
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
