// src/error.rs
//! Error types at the component seams. Application glue (config, `main`)
//! stays on `anyhow`.

use thiserror::Error;

/// One source failed to produce items. Logged and skipped by the poller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not parse response from {url}: {reason}")]
    Parse { url: String, reason: String },
    #[error("{0}")]
    Other(String),
}

/// The oracle answered but the answer was unusable. Always degrades to
/// "no selection".
#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("oracle response is not valid JSON: {0}")]
    Malformed(String),
    #[error("oracle response has no selected index")]
    MissingIndex,
    #[error("oracle picked index {index} but only {len} candidates were offered")]
    OutOfRange { index: i64, len: usize },
}

/// Dedup state could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid dedup state in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Delivery to a destination failed. The item stays unseen.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook answered HTTP {0}")]
    Status(u16),
    #[error("no destination configured for {0}")]
    NoDestination(String),
}

/// A cron expression was rejected at configuration time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("expression `{0}` can never fire")]
    NeverFires(String),
}

/// Anything that aborts a whole polling cycle. Triggers backoff.
///
/// Source fetch failures never end up here; they are absorbed per lane.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
