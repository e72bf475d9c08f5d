// src/notify/mod.rs
pub mod discord;

use async_trait::async_trait;
use std::fmt;

use crate::error::PublishError;
use crate::ingest::types::Item;

/// Where a lane's picks go. For Discord this is the webhook URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination(String);

impl Destination {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Webhook URLs embed a token; keep it out of logs.
impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.0.rsplit_once('/') {
            Some((head, _)) => format!("{head}/***"),
            None => "***".to_string(),
        };
        f.debug_tuple("Destination").field(&shown).finish()
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver one item. `Ok` means the destination confirmed receipt.
    async fn publish(&self, item: &Item, destination: &Destination) -> Result<(), PublishError>;
}
