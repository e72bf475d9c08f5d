// src/driver.rs
//! The polling loop: every cycle walks the four lanes in order, polls the
//! eligible ones, selects, publishes, and marks seen what was delivered.
//! Failures that abort a cycle put the loop into exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analyze::oracle::DynOracle;
use crate::analyze::select::{capped_ranked_merge, oracle_pick, pick_random};
use crate::backoff::Backoff;
use crate::config::{AppConfig, DriverConfig};
use crate::dedup::DedupStore;
use crate::error::CycleError;
use crate::ingest::poll_sources;
use crate::ingest::types::{Item, SourceFetcher};
use crate::lane::{DedupGroup, Lane, SelectionPolicy};
use crate::notify::Publisher;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("driver_cycles_total", "Completed polling cycles.");
        describe_counter!("driver_cycle_failures_total", "Cycles aborted by an error.");
        describe_gauge!(
            "driver_last_success_ts",
            "Unix time of the last successful cycle."
        );
        describe_counter!("publish_sent_total", "Items confirmed by the destination.");
        describe_counter!("publish_failed_total", "Items the destination rejected.");
    });
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub poll_interval: Duration,
    pub send_delay: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Topics handed to the ranking oracle.
    pub preferences: Vec<String>,
}

impl DriverSettings {
    pub fn from_config(cfg: &DriverConfig, preferences: Vec<String>) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            send_delay: cfg.send_delay(),
            base_backoff: cfg.base_backoff(),
            max_backoff: cfg.max_backoff(),
            preferences,
        }
    }
}

impl From<&AppConfig> for DriverSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self::from_config(&cfg.driver, cfg.oracle.key_topics.clone())
    }
}

/// External services the driver talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub feed_fetcher: Arc<dyn SourceFetcher>,
    pub forum_fetcher: Arc<dyn SourceFetcher>,
    pub oracle: DynOracle,
    pub publisher: Arc<dyn Publisher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Polling,
    BackingOff,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub lanes_checked: usize,
    pub candidates: usize,
    pub published: usize,
    pub publish_failed: usize,
}

pub struct Driver {
    lanes: Vec<Lane>,
    feeds: DedupStore,
    forums: DedupStore,
    services: Collaborators,
    settings: DriverSettings,
    backoff: Backoff,
    state: DriverState,
}

// ThreadRng is not Send; keep it out of async frames.
fn pick_one(candidates: Vec<Item>) -> Vec<Item> {
    pick_random(candidates, &mut rand::rng())
}

impl Driver {
    pub fn new(
        lanes: Vec<Lane>,
        feeds: DedupStore,
        forums: DedupStore,
        services: Collaborators,
        settings: DriverSettings,
    ) -> Self {
        ensure_metrics_described();
        let backoff = Backoff::new(settings.base_backoff, settings.max_backoff);
        Self {
            lanes,
            feeds,
            forums,
            services,
            settings,
            backoff,
            state: DriverState::Polling,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn store(&self, group: DedupGroup) -> &DedupStore {
        match group {
            DedupGroup::Feeds => &self.feeds,
            DedupGroup::Forums => &self.forums,
        }
    }

    pub fn error_count(&self) -> u32 {
        self.backoff.error_count()
    }

    /// One pass over all lanes at local time `now`.
    ///
    /// Source failures stay inside their lane: the lane is still marked
    /// checked and the lanes after it run as usual.
    pub async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport, CycleError> {
        let Driver {
            lanes,
            feeds,
            forums,
            services,
            settings,
            ..
        } = self;

        feeds.roll_over(now);
        forums.roll_over(now);

        let mut report = CycleReport::default();
        let mut dispatched = 0usize;

        for lane in lanes.iter_mut() {
            if !lane.schedule.is_eligible(now) {
                debug!(
                    lane = %lane.kind,
                    next = %lane.schedule.next_eligible_check(),
                    "lane not due"
                );
                continue;
            }
            report.lanes_checked += 1;

            let (store, fetcher) = match lane.kind.group() {
                DedupGroup::Feeds => (&mut *feeds, services.feed_fetcher.as_ref()),
                DedupGroup::Forums => (&mut *forums, services.forum_fetcher.as_ref()),
            };

            let only_today = lane.same_day_only.then(|| now.date());
            let outcome =
                poll_sources(fetcher, &lane.sources, |l| store.is_seen(l), only_today).await;
            report.candidates += outcome.items.len();
            info!(
                lane = %lane.kind,
                fetched = outcome.fetched,
                candidates = outcome.items.len(),
                dedup_dropped = outcome.dedup_dropped,
                stale_dropped = outcome.stale_dropped,
                failed_sources = outcome.failed_sources,
                "polled lane"
            );

            let picks = match &lane.policy {
                SelectionPolicy::SingleRandom => pick_one(outcome.items),
                SelectionPolicy::CappedRanked {
                    per_source_limit,
                    total_limit,
                } => capped_ranked_merge(outcome.items, *per_source_limit, *total_limit),
                SelectionPolicy::Oracle => oracle_pick(
                    services.oracle.as_ref(),
                    outcome.items,
                    &settings.preferences,
                )
                .await
                .map(|(item, _)| vec![item])
                .unwrap_or_default(),
            };
            lane.schedule.on_checked(now);

            if picks.is_empty() {
                debug!(lane = %lane.kind, "nothing selected");
                continue;
            }
            let Some(destination) = lane.destination.as_ref() else {
                warn!(lane = %lane.kind, selected = picks.len(), "no destination, skipping dispatch");
                continue;
            };

            for item in picks {
                if dispatched > 0 && !settings.send_delay.is_zero() {
                    tokio::time::sleep(settings.send_delay).await;
                }
                dispatched += 1;

                match services.publisher.publish(&item, destination).await {
                    Ok(()) => {
                        store.mark_seen(&item.link);
                        counter!("publish_sent_total", "lane" => lane.kind.as_str()).increment(1);
                        report.published += 1;
                        info!(lane = %lane.kind, title = %item.title, link = %item.link, "published");
                    }
                    Err(e) => {
                        counter!("publish_failed_total", "lane" => lane.kind.as_str()).increment(1);
                        report.publish_failed += 1;
                        warn!(lane = %lane.kind, link = %item.link, error = %e, "publish failed, item stays unseen");
                    }
                }
            }
        }

        Ok(report)
    }

    /// Fold a cycle result into the loop state and return how long to sleep.
    pub fn settle(&mut self, result: Result<CycleReport, CycleError>) -> Duration {
        match result {
            Ok(report) => {
                self.backoff.reset();
                self.state = DriverState::Polling;
                counter!("driver_cycles_total").increment(1);
                gauge!("driver_last_success_ts").set(Utc::now().timestamp() as f64);
                info!(
                    lanes_checked = report.lanes_checked,
                    published = report.published,
                    publish_failed = report.publish_failed,
                    "cycle complete"
                );
                self.settings.poll_interval
            }
            Err(e) => {
                let wait = self.backoff.next_wait();
                self.state = DriverState::BackingOff;
                counter!("driver_cycle_failures_total").increment(1);
                error!(
                    error = %e,
                    errors = self.backoff.error_count(),
                    wait_secs = wait.as_secs(),
                    "cycle failed, backing off"
                );
                wait
            }
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    /// Both an in-flight cycle and the sleep are abandoned on shutdown;
    /// links already marked seen stay marked.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(lanes = self.lanes.len(), "driver started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = Local::now().naive_local();
            let result = tokio::select! {
                res = self.run_cycle(now) => res,
                _ = shutdown.changed() => break,
            };
            let wait = self.settle(result);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.feeds.persist();
        self.forums.persist();
        info!("driver stopped");
    }
}
