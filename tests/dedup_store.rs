// tests/dedup_store.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use news_sharer::dedup::{load, DedupStore};

fn at(day: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

#[test]
fn marks_persist_across_restart_on_the_same_day() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("shown_reddit_posts.json");

    let mut store = DedupStore::open(&path, "posts", at(6, 9), true);
    store.mark_seen("https://reddit.test/a");
    store.mark_seen("https://reddit.test/a");
    assert_eq!(store.len(), 1);

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["posts"].as_array().unwrap().len(), 1);
    assert!(raw["last_reset_date"].as_str().unwrap().starts_with("2025-09-06"));

    let reopened = DedupStore::open(&path, "posts", at(6, 21), false);
    assert!(reopened.is_seen("https://reddit.test/a"));
}

#[test]
fn reset_on_start_discards_todays_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shown_articles.json");

    let mut store = DedupStore::open(&path, "articles", at(6, 9), true);
    store.mark_seen("https://news.test/1");

    let fresh = DedupStore::open(&path, "articles", at(6, 10), true);
    assert!(fresh.is_empty());
}

#[test]
fn file_from_an_earlier_day_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shown_articles.json");
    std::fs::write(
        &path,
        r#"{"lastResetDate": "2025-09-05T23:59:59.000000", "articles": ["https://news.test/old"]}"#,
    )
    .unwrap();

    let rec = load(&path, "articles", at(6, 0));
    assert!(rec.seen_links.is_empty());
    assert_eq!(rec.last_reset_date, at(6, 0));

    // Same calendar day: the legacy key is honoured.
    let rec = load(&path, "articles", NaiveDate::from_ymd_opt(2025, 9, 5).unwrap().and_hms_opt(8, 0, 0).unwrap());
    assert!(rec.is_seen("https://news.test/old"));
}

#[test]
fn corrupt_or_missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    assert!(load(&missing, "posts", at(6, 9)).seen_links.is_empty());

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, "{not json").unwrap();
    assert!(load(&corrupt, "posts", at(6, 9)).seen_links.is_empty());
}

#[test]
fn roll_over_clears_only_on_a_new_date() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shown_articles.json");
    let mut store = DedupStore::open(&path, "articles", at(6, 1), true);
    store.mark_seen("https://news.test/1");

    store.roll_over(at(6, 23));
    assert_eq!(store.len(), 1);

    store.roll_over(at(7, 0));
    assert!(store.is_empty());
    assert_eq!(store.record().last_reset_date, at(7, 0));
}
