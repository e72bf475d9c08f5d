// src/config/mod.rs
//! TOML configuration. Path resolution:
//! 1) $NEWS_SHARER_CONFIG (must exist)
//! 2) config/news_sharer.toml
//! 3) built-in defaults (no sources, so nothing is polled)

pub mod oracle;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::cron::CronSchedule;
use crate::ingest::providers::reddit::DEFAULT_BASE_URL;
use crate::ingest::types::Source;
use crate::lane::{Lane, LaneKind, SelectionPolicy};
use crate::notify::Destination;

use self::oracle::OracleConfig;

pub const ENV_CONFIG_PATH: &str = "NEWS_SHARER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_sharer.toml";

fn default_poll_interval_secs() -> u64 {
    4 * 60 * 60
}
fn default_base_backoff_secs() -> u64 {
    60
}
fn default_max_backoff_secs() -> u64 {
    3600
}
fn default_send_delay_ms() -> u64 {
    1000
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_feeds_state() -> PathBuf {
    PathBuf::from("state/shown_articles.json")
}
fn default_forums_state() -> PathBuf {
    PathBuf::from("state/shown_reddit_posts.json")
}
fn default_forum_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_publish_timeout_secs() -> u64 {
    5
}
fn default_publish_retries() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Sleep after a successful cycle.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Pause between two consecutive dispatches.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            send_delay_ms: default_send_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

/// Settings shared by both feed lanes' parent table and both forum lanes'.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaneConfig {
    pub schedule: Option<CronSchedule>,
    /// Discord webhook URL, or "ENV" for `DISCORD_WEBHOOK_<LANE>`.
    pub destination: Option<String>,
    pub same_day_only: Option<bool>,
    /// Feed lanes list `feeds`, forum lanes list `subreddits`.
    #[serde(default, alias = "feeds", alias = "subreddits")]
    pub sources: Vec<Source>,
    pub total_limit: Option<usize>,
    #[serde(alias = "per_subreddit_limit")]
    pub per_source_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_feeds_state")]
    pub state_file: PathBuf,
    /// Start every process with an empty dedup set.
    #[serde(default = "default_true")]
    pub reset_on_start: bool,
    #[serde(default)]
    pub serious: LaneConfig,
    #[serde(default)]
    pub fun: LaneConfig,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            state_file: default_feeds_state(),
            reset_on_start: true,
            serious: LaneConfig::default(),
            fun: LaneConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumsConfig {
    #[serde(default = "default_forums_state")]
    pub state_file: PathBuf,
    #[serde(default = "default_true")]
    pub reset_on_start: bool,
    #[serde(default = "default_forum_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub serious: LaneConfig,
    #[serde(default)]
    pub fun: LaneConfig,
}

impl Default for ForumsConfig {
    fn default() -> Self {
        Self {
            state_file: default_forums_state(),
            reset_on_start: true,
            base_url: default_forum_base_url(),
            serious: LaneConfig::default(),
            fun: LaneConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_publish_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_publish_retries")]
    pub max_retries: u8,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_publish_timeout_secs(),
            max_retries: default_publish_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// e.g. "127.0.0.1:9464"; no status server when absent.
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub forums: ForumsConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Parse and validate. Invalid cron expressions fail here.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        cfg.oracle.resolve();
        if cfg.driver.base_backoff_secs == 0 {
            return Err(anyhow!("driver.base_backoff_secs must be > 0"));
        }
        if cfg.driver.max_backoff_secs < cfg.driver.base_backoff_secs {
            cfg.driver.max_backoff_secs = cfg.driver.base_backoff_secs;
        }
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        tracing::warn!("no config file found, using defaults (no sources configured)");
        Self::from_toml_str("")
    }

    fn lane_config(&self, kind: LaneKind) -> &LaneConfig {
        match kind {
            LaneKind::SeriousFeed => &self.feeds.serious,
            LaneKind::FunFeed => &self.feeds.fun,
            LaneKind::SeriousForum => &self.forums.serious,
            LaneKind::FunForum => &self.forums.fun,
        }
    }

    /// Build one lane per kind, in cycle order.
    pub fn lanes(&self, now: NaiveDateTime) -> Result<Vec<Lane>> {
        LaneKind::ALL
            .iter()
            .map(|&kind| build_lane(kind, self.lane_config(kind), now))
            .collect()
    }
}

fn build_lane(kind: LaneKind, cfg: &LaneConfig, now: NaiveDateTime) -> Result<Lane> {
    let schedule = match &cfg.schedule {
        Some(s) => s.clone(),
        None => CronSchedule::parse(kind.default_schedule())
            .with_context(|| format!("default schedule of {kind}"))?,
    };

    let policy = match kind {
        LaneKind::SeriousFeed => SelectionPolicy::Oracle,
        LaneKind::FunFeed => SelectionPolicy::SingleRandom,
        LaneKind::SeriousForum => SelectionPolicy::CappedRanked {
            per_source_limit: cfg.per_source_limit.unwrap_or(3),
            total_limit: cfg.total_limit.unwrap_or(10),
        },
        LaneKind::FunForum => SelectionPolicy::CappedRanked {
            per_source_limit: cfg.per_source_limit.unwrap_or(2),
            total_limit: cfg.total_limit.unwrap_or(5),
        },
    };

    let sources = usable_sources(kind, &cfg.sources);

    let mut lane = Lane::new(kind, schedule, sources, policy, now);
    if let Some(same_day) = cfg.same_day_only {
        lane = lane.with_same_day_only(same_day);
    }
    if let Some(dest) = resolve_destination(kind, cfg.destination.as_deref()) {
        lane = lane.with_destination(dest);
    } else if !lane.sources.is_empty() {
        tracing::warn!(lane = %kind, "no destination configured; items will not be published");
    }
    Ok(lane)
}

/// Feeds need a URL, forums a name; anything else is dropped with a warning.
fn usable_sources(kind: LaneKind, sources: &[Source]) -> Vec<Source> {
    let is_feed = matches!(kind, LaneKind::SeriousFeed | LaneKind::FunFeed);
    sources
        .iter()
        .filter(|s| {
            let ok = if is_feed {
                s.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            } else {
                !s.name.trim().is_empty()
            };
            if !ok {
                tracing::warn!(lane = %kind, source = ?s, "ignoring source without url/name");
            }
            ok
        })
        .cloned()
        .collect()
}

fn resolve_destination(kind: LaneKind, raw: Option<&str>) -> Option<Destination> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if raw.eq_ignore_ascii_case("env") {
        return std::env::var(kind.destination_env())
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(Destination::new);
    }
    Some(Destination::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 6)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    const SAMPLE: &str = r#"
[driver]
poll_interval_secs = 600

[feeds.serious]
destination = "https://discord.test/hook/serious"
feeds = [
  { name = "Tech Daily", url = "https://tech.example.com/rss" },
  { name = "Broken" },
]

[feeds.fun]
schedule = "30 9 * * *"
feeds = [{ url = "https://fun.example.com/rss" }]

[forums.serious]
total_limit = 4
per_subreddit_limit = 1
subreddits = [{ name = "rust", sort = "top", top_period = "week", limit = 3 }]

[oracle]
api_key = "sk-test"
key_topics = ["rust"]
"#;

    #[test]
    fn sample_builds_four_lanes_with_defaults() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.driver.poll_interval_secs, 600);
        assert_eq!(cfg.driver.base_backoff_secs, 60);

        let lanes = cfg.lanes(now()).unwrap();
        let kinds: Vec<_> = lanes.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, LaneKind::ALL.to_vec());

        let serious_feed = &lanes[0];
        assert_eq!(serious_feed.sources.len(), 1, "source without url is dropped");
        assert_eq!(serious_feed.policy, SelectionPolicy::Oracle);
        assert_eq!(serious_feed.schedule.schedule().expression(), "0 8-23/4 * * *");
        assert!(serious_feed.same_day_only);
        assert_eq!(
            serious_feed.destination.as_ref().map(|d| d.as_str()),
            Some("https://discord.test/hook/serious")
        );

        let fun_feed = &lanes[1];
        assert_eq!(fun_feed.schedule.schedule().expression(), "30 9 * * *");
        assert_eq!(fun_feed.sources[0].display_name(), "https://fun.example.com/rss");
        assert!(!fun_feed.same_day_only);

        assert_eq!(
            lanes[2].policy,
            SelectionPolicy::CappedRanked {
                per_source_limit: 1,
                total_limit: 4
            }
        );
        assert_eq!(lanes[2].sources[0].limit, 3);
        assert_eq!(
            lanes[3].policy,
            SelectionPolicy::CappedRanked {
                per_source_limit: 2,
                total_limit: 5
            }
        );
    }

    #[test]
    fn invalid_cron_fails_at_load() {
        let bad = r#"
[forums.fun]
schedule = "0 25 * * *"
"#;
        assert!(AppConfig::from_toml_str(bad).is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_destination_is_resolved_per_lane() {
        std::env::set_var("DISCORD_WEBHOOK_FUN_FORUM", "https://discord.test/hook/fun");
        let cfg = AppConfig::from_toml_str(
            r#"
[forums.fun]
destination = "ENV"
subreddits = [{ name = "aww" }]
"#,
        )
        .unwrap();
        let lanes = cfg.lanes(now()).unwrap();
        assert_eq!(
            lanes[3].destination.as_ref().map(|d| d.as_str()),
            Some("https://discord.test/hook/fun")
        );
        std::env::remove_var("DISCORD_WEBHOOK_FUN_FORUM");
    }
}
