// src/ingest/scheduler.rs
use chrono::NaiveDateTime;

use crate::ingest::cron::CronSchedule;

/// Eligibility tracker for one lane.
/// - First check always allowed, regardless of `next_eligible_check`.
/// - Afterwards eligible once `now` reaches the next cron slot.
/// - Missed slots are not replayed; the next slot is computed from `now`.
#[derive(Debug, Clone)]
pub struct LaneSchedule {
    schedule: CronSchedule,
    next_eligible_check: NaiveDateTime,
    has_run_once: bool,
}

impl LaneSchedule {
    pub fn new(schedule: CronSchedule, now: NaiveDateTime) -> Self {
        Self {
            schedule,
            next_eligible_check: now,
            has_run_once: false,
        }
    }

    /// Does NOT mutate state.
    pub fn is_eligible(&self, now: NaiveDateTime) -> bool {
        !self.has_run_once || now >= self.next_eligible_check
    }

    /// Record a check at `now` and move to the next cron slot after it.
    pub fn on_checked(&mut self, now: NaiveDateTime) {
        self.has_run_once = true;
        self.next_eligible_check = self.schedule.next_after(now).unwrap_or_else(|| {
            tracing::warn!(schedule = %self.schedule, "cron expression has no future slot");
            NaiveDateTime::MAX
        });
    }

    pub fn next_eligible_check(&self) -> NaiveDateTime {
        self.next_eligible_check
    }

    pub fn has_run_once(&self) -> bool {
        self.has_run_once
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }
}
