// tests/common/mod.rs
// In-process stand-ins for the network-facing seams.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use news_sharer::analyze::oracle::{OracleSelection, RankingOracle};
use news_sharer::error::{FetchError, PublishError};
use news_sharer::{Destination, Item, Publisher, Source, SourceFetcher};

pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn item(link: &str, source: &str, published: Option<&str>) -> Item {
    let mut it = Item::new(link, format!("title {link}"), link, source);
    it.published_at = published.map(|p| DateTime::<FixedOffset>::parse_from_rfc3339(p).unwrap());
    it
}

/// Inside 2025-09-06 in its own offset.
pub const TODAY: &str = "2025-09-06T08:00:00+00:00";
pub const YESTERDAY: &str = "2025-09-05T08:00:00+00:00";

/// A forum post dated `TODAY`.
pub fn post(link: &str, source: &str, score: i64) -> Item {
    let mut it = item(link, source, Some(TODAY));
    it.score = Some(score);
    it
}

/// Serves canned batches keyed by source name. Unknown sources fail.
#[derive(Default, Clone)]
pub struct StubFetcher {
    batches: Arc<Mutex<HashMap<String, Result<Vec<Item>, String>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl StubFetcher {
    pub fn set(&self, source: &str, items: Vec<Item>) {
        self.batches
            .lock()
            .unwrap()
            .insert(source.to_string(), Ok(items));
    }

    pub fn fail(&self, source: &str) {
        self.batches
            .lock()
            .unwrap()
            .insert(source.to_string(), Err("connection refused".to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>, FetchError> {
        self.calls.lock().unwrap().push(source.name.clone());
        let batch = self.batches.lock().unwrap().get(&source.name).cloned();
        match batch {
            Some(Ok(items)) => Ok(items),
            Some(Err(reason)) => Err(FetchError::Other(reason)),
            None => Err(FetchError::Other(format!("no stub for {}", source.name))),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Records every delivery; links listed in `reject` answer HTTP 500.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub reject: Arc<Mutex<Vec<String>>>,
}

impl RecordingPublisher {
    pub fn reject(&self, link: &str) {
        self.reject.lock().unwrap().push(link.to_string());
    }

    pub fn sent_links(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, link)| link.clone())
            .collect()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, link)| link.clone())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, item: &Item, destination: &Destination) -> Result<(), PublishError> {
        if self.reject.lock().unwrap().contains(&item.link) {
            return Err(PublishError::Status(500));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.as_str().to_string(), item.link.clone()));
        Ok(())
    }
}

/// Always answers with the same index, valid or not.
pub struct FixedOracle(pub usize);

#[async_trait]
impl RankingOracle for FixedOracle {
    async fn select_best(
        &self,
        _candidates: &[Item],
        _preferences: &[String],
    ) -> Option<OracleSelection> {
        Some(OracleSelection {
            index: self.0,
            rationale: "fixed".to_string(),
            confidence: 1.0,
            matched_topics: Vec::new(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fixed"
    }
}
