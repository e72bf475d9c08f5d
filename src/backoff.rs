// src/backoff.rs
use std::time::Duration;

/// Exponential backoff: `min(base * 2^errors, max)`, counter reset on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    error_count: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            error_count: 0,
        }
    }

    /// Wait for the current failure streak, then count one more failure.
    pub fn next_wait(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.error_count).unwrap_or(u32::MAX);
        let wait = self.base.saturating_mul(factor).min(self.max);
        self.error_count = self.error_count.saturating_add(1);
        wait
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}
