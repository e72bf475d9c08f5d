// src/dedup.rs
//! Persisted set of links already shared, one file per dedup group
//! (feeds, forums). The set only lives for one calendar day.
//!
//! File shape: `{"last_reset_date": "<ISO-8601>", "<items_key>": [links...]}`.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::PersistenceError;

const RESET_KEY: &str = "last_reset_date";
const RESET_KEY_ALIAS: &str = "lastResetDate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRecord {
    pub last_reset_date: NaiveDateTime,
    pub seen_links: BTreeSet<String>,
}

impl DedupRecord {
    pub fn empty(now: NaiveDateTime) -> Self {
        Self {
            last_reset_date: now,
            seen_links: BTreeSet::new(),
        }
    }

    pub fn is_seen(&self, link: &str) -> bool {
        self.seen_links.contains(link)
    }

    /// Returns `true` if the link was not present yet.
    pub fn mark_seen(&mut self, link: &str) -> bool {
        !self.seen_links.contains(link) && self.seen_links.insert(link.to_string())
    }

    /// Calendar-date comparison only; time of day never matters.
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        self.last_reset_date.date() != now.date()
    }

    /// Clear and stamp `now` if the record belongs to another day.
    pub fn roll_over(&mut self, now: NaiveDateTime) -> bool {
        if !self.is_stale(now) {
            return false;
        }
        self.seen_links.clear();
        self.last_reset_date = now;
        true
    }

    fn to_json(&self, items_key: &str) -> Value {
        let mut obj = Map::new();
        obj.insert(
            RESET_KEY.to_string(),
            Value::String(self.last_reset_date.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        );
        obj.insert(
            items_key.to_string(),
            Value::Array(self.seen_links.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(obj)
    }
}

/// Accepts naive ISO date-times, RFC 3339 with offset, or a bare date.
fn parse_reset_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn read_record(path: &Path, items_key: &str) -> Result<Option<DedupRecord>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    let value: Value = serde_json::from_str(&raw).map_err(|source| PersistenceError::Json {
        path: path.display().to_string(),
        source,
    })?;

    let Some(reset) = value
        .get(RESET_KEY)
        .or_else(|| value.get(RESET_KEY_ALIAS))
        .and_then(Value::as_str)
        .and_then(parse_reset_date)
    else {
        // No usable date: treat as stale.
        return Ok(None);
    };

    let seen_links = value
        .get(items_key)
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(Value::as_str)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(DedupRecord {
        last_reset_date: reset,
        seen_links,
    }))
}

/// Load a record. Never fails: a missing, corrupt, or stale file yields an
/// empty set stamped `now`.
pub fn load(path: &Path, items_key: &str, now: NaiveDateTime) -> DedupRecord {
    match read_record(path, items_key) {
        Ok(Some(rec)) if !rec.is_stale(now) => {
            info!(path = %path.display(), count = rec.seen_links.len(), "loaded dedup state");
            rec
        }
        Ok(Some(_)) => {
            info!(path = %path.display(), "dedup state is from another day, resetting");
            DedupRecord::empty(now)
        }
        Ok(None) => {
            info!(path = %path.display(), "no usable dedup state, starting empty");
            DedupRecord::empty(now)
        }
        Err(e) => {
            error!(error = %e, "error loading dedup state, starting empty");
            DedupRecord::empty(now)
        }
    }
}

/// Overwrite `path` with `record` (temp file + rename).
pub fn save(record: &DedupRecord, path: &Path, items_key: &str) -> Result<(), PersistenceError> {
    let io_err = |source: std::io::Error| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let json = serde_json::to_vec(&record.to_json(items_key)).map_err(|source| {
        PersistenceError::Json {
            path: path.display().to_string(),
            source,
        }
    })?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).map_err(io_err)?;
    f.write_all(&json).map_err(io_err)?;
    f.sync_all().map_err(io_err)?;
    drop(f);
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// A dedup group bound to its file.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    items_key: String,
    record: DedupRecord,
}

impl DedupStore {
    /// Load the group's state. With `reset_on_start` the set is cleared even
    /// if the file is from today, so every process start begins empty.
    pub fn open(
        path: impl Into<PathBuf>,
        items_key: impl Into<String>,
        now: NaiveDateTime,
        reset_on_start: bool,
    ) -> Self {
        let path = path.into();
        let items_key = items_key.into();
        let record = if reset_on_start {
            info!(path = %path.display(), "resetting dedup state for new session");
            DedupRecord::empty(now)
        } else {
            load(&path, &items_key, now)
        };
        Self {
            path,
            items_key,
            record,
        }
    }

    pub fn is_seen(&self, link: &str) -> bool {
        self.record.is_seen(link)
    }

    /// Mark and flush immediately. Save failures are logged, never raised.
    pub fn mark_seen(&mut self, link: &str) {
        if self.record.mark_seen(link) {
            self.persist();
        }
    }

    /// Apply the daily reset while running.
    pub fn roll_over(&mut self, now: NaiveDateTime) {
        if self.record.roll_over(now) {
            info!(path = %self.path.display(), "new day, dedup state cleared");
            self.persist();
        }
    }

    pub fn persist(&self) {
        match save(&self.record, &self.path, &self.items_key) {
            Ok(()) => debug!(
                path = %self.path.display(),
                count = self.record.seen_links.len(),
                "saved dedup state"
            ),
            Err(e) => warn!(error = %e, "error saving dedup state"),
        }
    }

    pub fn record(&self) -> &DedupRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.record.seen_links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.seen_links.is_empty()
    }
}
