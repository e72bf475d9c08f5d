// src/lane.rs
//! The four polling lanes and what distinguishes them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ingest::cron::CronSchedule;
use crate::ingest::scheduler::LaneSchedule;
use crate::ingest::types::Source;
use crate::notify::Destination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaneKind {
    SeriousFeed,
    FunFeed,
    SeriousForum,
    FunForum,
}

impl LaneKind {
    /// Fixed iteration order of a cycle.
    pub const ALL: [LaneKind; 4] = [
        LaneKind::SeriousFeed,
        LaneKind::FunFeed,
        LaneKind::SeriousForum,
        LaneKind::FunForum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LaneKind::SeriousFeed => "serious-feed",
            LaneKind::FunFeed => "fun-feed",
            LaneKind::SeriousForum => "serious-forum",
            LaneKind::FunForum => "fun-forum",
        }
    }

    pub fn is_serious(self) -> bool {
        matches!(self, LaneKind::SeriousFeed | LaneKind::SeriousForum)
    }

    pub fn group(self) -> DedupGroup {
        match self {
            LaneKind::SeriousFeed | LaneKind::FunFeed => DedupGroup::Feeds,
            LaneKind::SeriousForum | LaneKind::FunForum => DedupGroup::Forums,
        }
    }

    /// Environment variable consulted when a destination is `"ENV"`.
    pub fn destination_env(self) -> String {
        format!(
            "DISCORD_WEBHOOK_{}",
            self.as_str().replace('-', "_").to_ascii_uppercase()
        )
    }

    /// Cron cadence used when the config gives none.
    pub fn default_schedule(self) -> &'static str {
        match self {
            LaneKind::SeriousFeed => "0 8-23/4 * * *",
            LaneKind::FunFeed => "0 8-23 * * *",
            LaneKind::SeriousForum => "0 */4 * * *",
            LaneKind::FunForum => "0 * * * *",
        }
    }
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lanes of one group share a dedup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupGroup {
    Feeds,
    Forums,
}

impl DedupGroup {
    /// JSON key holding the link list in the group's state file.
    pub fn items_key(self) -> &'static str {
        match self {
            DedupGroup::Feeds => "articles",
            DedupGroup::Forums => "posts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// One uniformly random candidate.
    SingleRandom,
    /// Per-source cap, score ranking, total cap.
    CappedRanked {
        per_source_limit: usize,
        total_limit: usize,
    },
    /// Newest few candidates, best one picked by the oracle.
    Oracle,
}

#[derive(Debug, Clone)]
pub struct Lane {
    pub kind: LaneKind,
    pub schedule: LaneSchedule,
    pub sources: Vec<Source>,
    pub policy: SelectionPolicy,
    pub destination: Option<Destination>,
    /// Drop candidates not published on the current calendar date.
    pub same_day_only: bool,
}

impl Lane {
    pub fn new(
        kind: LaneKind,
        schedule: CronSchedule,
        sources: Vec<Source>,
        policy: SelectionPolicy,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            kind,
            schedule: LaneSchedule::new(schedule, now),
            sources,
            policy,
            destination: None,
            same_day_only: kind.is_serious(),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_same_day_only(mut self, on: bool) -> Self {
        self.same_day_only = on;
        self
    }
}
