// src/ingest/providers/rss.rs
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{Item, Source, SourceFetcher};

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "media:content", default)]
    media: Vec<Media>,
    #[serde(default)]
    enclosure: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

/// Element whose attributes we ignore.
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// RFC 2822 first (RSS), then RFC 3339 (Atom and some RSS generators).
pub fn parse_published(ts: &str) -> Option<DateTime<FixedOffset>> {
    let ts = ts.trim();
    DateTime::parse_from_rfc2822(ts)
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
}

fn is_image(kind: Option<&str>) -> bool {
    kind.map(|k| k.starts_with("image/")).unwrap_or(false)
}

/// Parse an RSS 2.0 or Atom document into items labelled with `source_name`.
pub fn parse_feed(xml: &str, source_name: &str) -> Result<Vec<Item>, String> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    match from_str::<Rss>(&xml_clean) {
        Ok(rss) => Ok(rss
            .channel
            .item
            .into_iter()
            .filter_map(|it| rss_item(it, source_name))
            .collect()),
        Err(rss_err) => match from_str::<AtomFeed>(&xml_clean) {
            Ok(feed) if !feed.entry.is_empty() || xml_clean.contains("<feed") => Ok(feed
                .entry
                .into_iter()
                .filter_map(|e| atom_entry(e, source_name))
                .collect()),
            _ => Err(rss_err.to_string()),
        },
    }
}

fn rss_item(it: RssItem, source_name: &str) -> Option<Item> {
    let link = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;

    let image_url = it
        .media
        .iter()
        .find_map(|m| m.url.clone())
        .or_else(|| {
            it.enclosure
                .iter()
                .find(|e| is_image(e.kind.as_deref()))
                .and_then(|e| e.url.clone())
        });

    let mut item = Item::new(
        it.guid
            .map(|g| g.value.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| link.clone()),
        normalize_text(it.title.as_deref().unwrap_or_default()),
        link,
        source_name,
    );
    item.content = normalize_text(it.description.as_deref().unwrap_or_default());
    item.published_at = it.pub_date.as_deref().and_then(parse_published);
    item.image_url = image_url;
    Some(item)
}

fn atom_entry(e: AtomEntry, source_name: &str) -> Option<Item> {
    let link = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .and_then(|l| l.href.clone())
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())?;

    let image_url = e
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure") && is_image(l.kind.as_deref()))
        .and_then(|l| l.href.clone());

    let body = e.summary.or(e.content).map(|t| t.value).unwrap_or_default();

    let mut item = Item::new(
        e.id.unwrap_or_else(|| link.clone()),
        normalize_text(&e.title.map(|t| t.value).unwrap_or_default()),
        link,
        source_name,
    );
    item.content = normalize_text(&body);
    item.published_at = e
        .published
        .as_deref()
        .or(e.updated.as_deref())
        .and_then(parse_published);
    item.image_url = image_url;
    Some(item)
}

/// Syndication feed fetcher (RSS 2.0 / Atom over HTTP).
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("news-sharer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for FeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>, FetchError> {
        let url = source
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| FetchError::Other(format!("feed {} has no url", source.name)))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                source: e,
            })?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;

        let items = parse_feed(&body, source.display_name()).map_err(|reason| FetchError::Parse {
            url: url.to_string(),
            reason,
        })?;
        tracing::debug!(url, count = items.len(), "parsed feed");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

/// XML has no HTML named entities; replace the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Tech Daily</title>
    <item>
      <title>Rust 2.0 &amp; beyond</title>
      <link>https://example.com/a</link>
      <guid isPermaLink="false">a-1</guid>
      <pubDate>Sat, 06 Sep 2025 09:00:00 +0000</pubDate>
      <description>&lt;p&gt;Big&amp;nbsp;news&lt;/p&gt;</description>
      <media:content url="https://img.example.com/a.jpg" medium="image"/>
    </item>
    <item>
      <title>No date</title>
      <link>https://example.com/b</link>
      <enclosure url="https://img.example.com/b.png" type="image/png" length="1"/>
    </item>
    <item>
      <title>No link is skipped</title>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Science Blog</title>
  <entry>
    <id>urn:1</id>
    <title type="html">Comets</title>
    <link rel="alternate" href="https://science.example.com/comets"/>
    <updated>2025-09-06T10:00:00Z</updated>
    <summary>Icy &lt;i&gt;visitors&lt;/i&gt;</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS, "Tech Daily").unwrap();
        assert_eq!(items.len(), 2);

        let a = &items[0];
        assert_eq!(a.id, "a-1");
        assert_eq!(a.title, "Rust 2.0 & beyond");
        assert_eq!(a.link, "https://example.com/a");
        assert_eq!(a.content, "Big news");
        assert_eq!(a.source, "Tech Daily");
        assert_eq!(a.image_url.as_deref(), Some("https://img.example.com/a.jpg"));
        assert!(a.published_at.is_some());

        let b = &items[1];
        assert_eq!(b.id, "https://example.com/b");
        assert!(b.published_at.is_none());
        assert_eq!(b.image_url.as_deref(), Some("https://img.example.com/b.png"));
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM, "Science").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://science.example.com/comets");
        assert_eq!(items[0].content, "Icy visitors");
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn published_accepts_both_formats() {
        assert!(parse_published("Sat, 06 Sep 2025 09:00:00 GMT").is_some());
        assert!(parse_published("2025-09-06T09:00:00+02:00").is_some());
        assert!(parse_published("last tuesday").is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed("not xml at all", "x").is_err());
    }
}
