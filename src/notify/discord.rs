// src/notify/discord.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Destination, Publisher};
use crate::error::PublishError;
use crate::ingest::types::Item;

const REDDIT_ORANGE: u32 = 0xFF4500;
const DEFAULT_COLOR: u32 = 0x95a5a6;
const PREVIEW_CHARS: usize = 200;
const TITLE_MAX_CHARS: usize = 256;
const FIELD_MAX_CHARS: usize = 1024;

/// Source-name keywords and the embed color they map to. First match wins.
const CATEGORY_COLORS: &[(&str, u32)] = &[
    ("technology", 0x3498db),
    ("tech", 0x3498db),
    ("finance", 0x2ecc71),
    ("politics", 0xe74c3c),
    ("sports", 0xf39c12),
    ("entertainment", 0x9b59b6),
    ("science", 0x1abc9c),
    ("health", 0xe67e22),
    ("world", 0x34495e),
    ("business", 0x27ae60),
];

#[derive(Clone)]
pub struct DiscordPublisher {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl Default for DiscordPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordPublisher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    async fn publish(&self, item: &Item, destination: &Destination) -> Result<(), PublishError> {
        let payload = DiscordWebhookPayload::for_item(item);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(destination.as_str())
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => {
                    tracing::debug!(link = %item.link, attempt, "discord accepted item");
                    return Ok(());
                }
                Ok(rsp) => PublishError::Status(rsp.status().as_u16()),
                Err(e) => PublishError::Request(e),
            };

            if attempt < self.max_retries {
                tracing::warn!(error = %err, attempt, "discord webhook failed, retrying");
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
            return Err(err);
        }
    }
}

/// Pause after failed attempt `attempt` (1-based): 500 ms doubling, capped at 64 s.
fn retry_delay(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << attempt.saturating_sub(1).min(7))
}

/// Embed color for a feed item, keyed on its source name.
pub fn category_color(source: &str) -> u32 {
    let lower = source.to_lowercase();
    CATEGORY_COLORS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|&(_, c)| c)
        .unwrap_or(DEFAULT_COLOR)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// First `PREVIEW_CHARS` characters, with "..." when cut.
fn preview(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(PREVIEW_CHARS).collect();
        out.push_str("...");
        out
    }
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedText {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: String,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<EmbedAuthor>,
    footer: EmbedText,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
}

#[derive(Debug, Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    /// Forum posts carry a score; they get the forum styling.
    fn for_item(item: &Item) -> Self {
        let is_forum_post = item.score.is_some();
        let mut fields = Vec::new();

        if is_forum_post {
            fields.push(EmbedField {
                name: "Engagement".to_string(),
                value: format!(
                    "⬆️ {} | 💬 {}",
                    item.score.unwrap_or(0),
                    item.comments.unwrap_or(0)
                ),
                inline: true,
            });
            if item.is_crosspost {
                if let Some(target) = item.target_url.as_deref() {
                    fields.push(EmbedField {
                        name: "Crosspost".to_string(),
                        value: truncate_chars(&format!("[Original Post]({target})"), FIELD_MAX_CHARS),
                        inline: true,
                    });
                }
            }
            if let Some(flair) = item.flair.as_deref().filter(|f| !f.trim().is_empty()) {
                fields.push(EmbedField {
                    name: "Flair".to_string(),
                    value: truncate_chars(flair, FIELD_MAX_CHARS),
                    inline: true,
                });
            }
        }

        let embed = DiscordEmbed {
            title: truncate_chars(&item.title, TITLE_MAX_CHARS),
            url: item.link.clone(),
            description: preview(&item.content),
            color: if is_forum_post {
                REDDIT_ORANGE
            } else {
                category_color(&item.source)
            },
            timestamp: item.published_at.map(|p| p.to_rfc3339()),
            author: is_forum_post.then(|| EmbedAuthor {
                name: format!("r/{}", item.source),
            }),
            footer: EmbedText {
                text: format!("Source: {}", item.source),
            },
            fields,
            thumbnail: item
                .thumbnail_url
                .clone()
                .filter(|_| item.image_url.is_none())
                .map(|url| EmbedImage { url }),
            image: item.image_url.clone().map(|url| EmbedImage { url }),
        };

        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}
