// tests/config_file.rs
use std::path::Path;

use chrono::NaiveDate;
use serial_test::serial;

use news_sharer::config::{AppConfig, ENV_CONFIG_PATH};
use news_sharer::{LaneKind, SelectionPolicy};

fn shipped_config() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/news_sharer.toml")
}

#[test]
#[serial]
fn shipped_config_builds_all_lanes() {
    std::env::set_var("DISCORD_WEBHOOK_SERIOUS_FEED", "https://discord.test/hook/1");
    let cfg = AppConfig::load_from(&shipped_config()).unwrap();
    let now = NaiveDate::from_ymd_opt(2025, 9, 6)
        .unwrap()
        .and_hms_opt(7, 0, 0)
        .unwrap();
    let lanes = cfg.lanes(now).unwrap();

    assert_eq!(lanes.len(), 4);
    assert_eq!(lanes[0].kind, LaneKind::SeriousFeed);
    assert!(lanes[0].destination.is_some());
    assert_eq!(lanes[2].sources.len(), 2);
    assert_eq!(
        lanes[2].policy,
        SelectionPolicy::CappedRanked {
            per_source_limit: 3,
            total_limit: 10
        }
    );
    assert!(lanes.iter().all(|l| l.schedule.is_eligible(now)));
    assert_eq!(cfg.feeds.state_file, Path::new("state/shown_articles.json"));
    assert!(cfg.metrics.listen_addr.is_none());
    std::env::remove_var("DISCORD_WEBHOOK_SERIOUS_FEED");
}

#[test]
#[serial]
fn env_override_must_point_to_a_file() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    assert!(AppConfig::load_default().is_err());

    std::env::set_var(ENV_CONFIG_PATH, shipped_config());
    assert!(AppConfig::load_default().is_ok());
    std::env::remove_var(ENV_CONFIG_PATH);
}
