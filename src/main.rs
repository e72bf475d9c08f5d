//! news-sharer binary entrypoint.
//! Loads config, wires fetchers, oracle and Discord publisher into the
//! driver, and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_sharer::analyze::build_oracle;
use news_sharer::config::AppConfig;
use news_sharer::dedup::DedupStore;
use news_sharer::driver::{Collaborators, Driver, DriverSettings};
use news_sharer::ingest::providers::{FeedFetcher, RedditFetcher};
use news_sharer::lane::DedupGroup;
use news_sharer::metrics::Metrics;
use news_sharer::notify::discord::DiscordPublisher;

/// `RUST_LOG` controls the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_sharer=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let now = Local::now().naive_local();
    let lanes = cfg.lanes(now)?;

    let feeds = DedupStore::open(
        cfg.feeds.state_file.clone(),
        DedupGroup::Feeds.items_key(),
        now,
        cfg.feeds.reset_on_start,
    );
    let forums = DedupStore::open(
        cfg.forums.state_file.clone(),
        DedupGroup::Forums.items_key(),
        now,
        cfg.forums.reset_on_start,
    );

    let services = Collaborators {
        feed_fetcher: Arc::new(FeedFetcher::new(cfg.driver.fetch_timeout_secs)),
        forum_fetcher: Arc::new(RedditFetcher::new(
            cfg.forums.base_url.clone(),
            cfg.driver.fetch_timeout_secs,
        )),
        oracle: build_oracle(&cfg.oracle),
        publisher: Arc::new(
            DiscordPublisher::new()
                .with_timeout(cfg.publisher.timeout_secs)
                .with_retries(cfg.publisher.max_retries),
        ),
    };

    let driver = Driver::new(lanes, feeds, forums, services, DriverSettings::from(&cfg));

    if let Some(addr) = cfg.metrics.listen_addr.clone() {
        let metrics = Metrics::init()?;
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(&addr).await {
                tracing::error!(error = %e, "metrics endpoint stopped");
            }
        });
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        let _ = tx.send(true);
    });

    driver.run(rx).await;
    Ok(())
}
