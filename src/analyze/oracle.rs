//! Ranking oracle: provider abstraction for "pick the best item" calls.
//! The chat provider speaks the OpenAI-compatible chat-completions API
//! (DeepSeek by default). Every failure mode collapses to `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::oracle::OracleConfig;
use crate::error::SelectionError;
use crate::ingest::types::Item;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// The oracle's choice among the offered candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSelection {
    pub index: usize,
    pub rationale: String,
    pub confidence: f32,
    pub matched_topics: Vec<String>,
}

#[async_trait]
pub trait RankingOracle: Send + Sync {
    /// Pick one of `candidates` given topic `preferences`, or decline.
    async fn select_best(
        &self,
        candidates: &[Item],
        preferences: &[String],
    ) -> Option<OracleSelection>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn RankingOracle>;

/// Build the oracle described by `config`.
///
/// * Disabled config or missing API key → `DisabledOracle`.
/// * Otherwise the chat-completions provider.
pub fn build_oracle(config: &OracleConfig) -> DynOracle {
    if !config.enabled {
        return Arc::new(DisabledOracle);
    }
    if config.api_key.trim().is_empty() {
        tracing::warn!("oracle enabled but no API key resolved; serious feeds will select nothing");
        return Arc::new(DisabledOracle);
    }
    Arc::new(ChatOracle::new(config))
}

/// Always declines; used when the oracle is disabled.
pub struct DisabledOracle;

#[async_trait]
impl RankingOracle for DisabledOracle {
    async fn select_best(&self, _candidates: &[Item], _preferences: &[String]) -> Option<OracleSelection> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

// ------------------------------------------------------------
// Chat-completions provider
// ------------------------------------------------------------

pub struct ChatOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatOracle {
    pub fn new(config: &OracleConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-sharer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    async fn complete(&self, prompt: &str) -> Option<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You are an expert at selecting the most relevant and high-quality news articles based on user preferences.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "oracle request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::error!(status = resp.status().as_u16(), "oracle answered non-2xx");
            return None;
        }
        let body: Resp = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "oracle response body unreadable");
                return None;
            }
        };
        body.choices.into_iter().next().map(|c| c.message.content)
    }
}

#[async_trait]
impl RankingOracle for ChatOracle {
    async fn select_best(
        &self,
        candidates: &[Item],
        preferences: &[String],
    ) -> Option<OracleSelection> {
        if candidates.is_empty() {
            tracing::warn!("no candidates offered to oracle");
            return None;
        }
        tracing::info!(count = candidates.len(), "asking oracle for best item");

        let prompt = selection_prompt(candidates, preferences);
        let content = self.complete(&prompt).await?;
        tracing::debug!(%content, "oracle raw response");

        match parse_selection(&content, candidates.len()) {
            Ok(sel) => Some(sel),
            Err(e) => {
                tracing::warn!(error = %e, "unusable oracle response");
                None
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "chat"
    }
}

// ------------------------------------------------------------
// Prompt + response handling
// ------------------------------------------------------------

#[derive(Serialize)]
struct CandidateView<'a> {
    title: &'a str,
    link: &'a str,
    published: Option<String>,
    content: &'a str,
    source: &'a str,
}

/// Prompt listing the candidates (in offered order) and the topics.
pub fn selection_prompt(candidates: &[Item], preferences: &[String]) -> String {
    let views: Vec<CandidateView<'_>> = candidates
        .iter()
        .map(|c| CandidateView {
            title: &c.title,
            link: &c.link,
            published: c.published_at.map(|p| p.to_rfc2822()),
            content: &c.content,
            source: &c.source,
        })
        .collect();
    let articles = serde_json::to_string_pretty(&views).unwrap_or_else(|_| "[]".to_string());
    let topics = serde_json::to_string_pretty(preferences).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"Select the best article from the following list based on the specified topics and preferences.
The best article should be the most relevant to the topics and have the highest quality content.

Articles: {articles}
Topics: {topics}

Respond in JSON format with the following structure:
{{
    "selected_article_index": 0,
    "reason": "Brief explanation of why this article was selected",
    "relevance_score": 0.0-1.0,
    "matching_topics": ["topic1", "topic2"]
}}"#
    )
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    selected_article_index: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    relevance_score: Option<serde_json::Value>,
    #[serde(default)]
    matching_topics: Option<Vec<String>>,
}

/// Remove a surrounding ```json / ``` fence.
fn strip_fence(content: &str) -> &str {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Validate an oracle answer against `len` offered candidates.
pub fn parse_selection(content: &str, len: usize) -> Result<OracleSelection, SelectionError> {
    let raw: RawSelection = serde_json::from_str(strip_fence(content))
        .map_err(|e| SelectionError::Malformed(e.to_string()))?;

    let index = raw
        .selected_article_index
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .ok_or(SelectionError::MissingIndex)?;
    if index < 0 || index as u64 >= len as u64 {
        return Err(SelectionError::OutOfRange { index, len });
    }

    let confidence = raw
        .relevance_score
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    Ok(OracleSelection {
        index: index as usize,
        rationale: raw.reason.unwrap_or_default(),
        confidence,
        matched_topics: raw.matching_topics.unwrap_or_default(),
    })
}
