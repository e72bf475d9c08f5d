// src/ingest/mod.rs
pub mod cron;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::{Item, Source, SourceFetcher};
use chrono::NaiveDate;
use metrics::{counter, describe_counter, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_items_fetched_total", "Items returned by fetch adapters.");
        describe_counter!(
            "poll_dedup_dropped_total",
            "Items dropped because their link was already shared or repeated."
        );
        describe_counter!(
            "poll_stale_dropped_total",
            "Items dropped by the same-day filter of serious lanes."
        );
        describe_counter!("poll_source_errors_total", "Per-source fetch failures.");
    });
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (escaped markup becomes real tags and is stripped next)
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Second pass for entities that were double-escaped
    out = html_escape::decode_html_entities(&out).to_string();

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Was the item published on `today`, judged in the item's own offset?
/// Items without a date are never "today".
pub fn published_on(item: &Item, today: NaiveDate) -> bool {
    item.published_at
        .map(|ts| ts.date_naive() == today)
        .unwrap_or(false)
}

/// Counters from one lane poll.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub items: Vec<Item>,
    pub fetched: usize,
    pub dedup_dropped: usize,
    pub stale_dropped: usize,
    pub failed_sources: usize,
}

/// Merge fetched batches (in source order) into the candidate list.
///
/// Drops links already seen in the dedup group, links repeated within the
/// batches (first occurrence wins), empty links, and, when `only_today` is
/// given, anything not published on that date.
pub fn filter_candidates<F>(
    batches: Vec<Vec<Item>>,
    is_seen: F,
    only_today: Option<NaiveDate>,
) -> PollOutcome
where
    F: Fn(&str) -> bool,
{
    let mut out = PollOutcome::default();
    let mut seen_links: HashSet<String> = HashSet::new();

    for item in batches.into_iter().flatten() {
        out.fetched += 1;
        if item.link.is_empty() || is_seen(&item.link) || seen_links.contains(&item.link) {
            out.dedup_dropped += 1;
            continue;
        }
        if let Some(today) = only_today {
            if !published_on(&item, today) {
                out.stale_dropped += 1;
                continue;
            }
        }
        seen_links.insert(item.link.clone());
        out.items.push(item);
    }
    out
}

/// Fetch every source concurrently, then merge in declaration order.
///
/// A failing source is logged, counted in `failed_sources` and skipped; the
/// remaining sources still contribute. A poll never fails as a whole.
pub async fn poll_sources<F>(
    fetcher: &dyn SourceFetcher,
    sources: &[Source],
    is_seen: F,
    only_today: Option<NaiveDate>,
) -> PollOutcome
where
    F: Fn(&str) -> bool,
{
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let results = futures::future::join_all(sources.iter().map(|s| fetcher.fetch(s))).await;

    let mut batches = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (source, res) in sources.iter().zip(results) {
        match res {
            Ok(items) => {
                tracing::debug!(
                    source = source.display_name(),
                    fetcher = fetcher.name(),
                    count = items.len(),
                    "fetched source"
                );
                batches.push(items);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    source = source.display_name(),
                    fetcher = fetcher.name(),
                    "source fetch failed, skipping"
                );
                counter!("poll_source_errors_total").increment(1);
                failed += 1;
            }
        }
    }
    if !sources.is_empty() && failed == sources.len() {
        tracing::warn!(
            sources = failed,
            fetcher = fetcher.name(),
            "every source of the lane failed"
        );
    }

    let mut outcome = filter_candidates(batches, is_seen, only_today);
    outcome.failed_sources = failed;

    histogram!("poll_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("poll_items_fetched_total").increment(outcome.fetched as u64);
    counter!("poll_dedup_dropped_total").increment(outcome.dedup_dropped as u64);
    counter!("poll_stale_dropped_total").increment(outcome.stale_dropped as u64);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn item(link: &str, source: &str, published: Option<&str>) -> Item {
        let mut it = Item::new(link, format!("title {link}"), link, source);
        it.published_at = published.map(|p| DateTime::<FixedOffset>::parse_from_rfc3339(p).unwrap());
        it
    }

    #[test]
    fn normalize_text_strips_markup_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp;<b>world</b></p>&lt;br/&gt;  ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn already_seen_links_are_dropped() {
        let batches = vec![vec![item("a", "A", None), item("b", "A", None)]];
        let out = filter_candidates(batches, |l| l == "a", None);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].link, "b");
        assert_eq!(out.dedup_dropped, 1);
    }

    #[test]
    fn only_today_keeps_same_date_in_item_offset() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 6).unwrap();
        let batches = vec![vec![
            item("a", "A", Some("2025-09-06T23:30:00-05:00")),
            item("b", "A", Some("2025-09-05T12:00:00+00:00")),
            item("c", "A", None),
        ]];
        let out = filter_candidates(batches, |_| false, Some(today));
        let links: Vec<_> = out.items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["a"]);
        assert_eq!(out.stale_dropped, 2);
    }

    #[test]
    fn empty_links_never_pass() {
        let out = filter_candidates(vec![vec![item("", "A", None)]], |_| false, None);
        assert!(out.items.is_empty());
    }
}
