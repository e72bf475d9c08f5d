// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod backoff;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod error;
pub mod ingest;
pub mod lane;
pub mod metrics;
pub mod notify;

pub use crate::config::AppConfig;
pub use crate::driver::{Collaborators, CycleReport, Driver, DriverSettings, DriverState};
pub use crate::ingest::types::{Item, Source, SourceFetcher};
pub use crate::lane::{Lane, LaneKind, SelectionPolicy};
pub use crate::notify::{Destination, Publisher};
