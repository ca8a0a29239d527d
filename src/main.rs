use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod dashboard;
mod db;
mod error;
mod lotto;
mod picker;
mod sync;

use config::Config;
use dashboard::{ApiSettings, AppState};
use db::DrawStore;
use lotto::{DrawSource, LottoApiClient, OfflineSource, TtlCache};
use sync::Refresher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = DrawStore::open(&config.data_dir)?;
    info!(
        "Draw store: {} ({} draws, newest {})",
        store.path().display(),
        store.len(),
        store.max_draw_no()
    );

    let source: Arc<dyn DrawSource> = if config.live_fetch {
        Arc::new(LottoApiClient::new(
            &config.lotto_api_url,
            config.fetch_timeout(),
            config.fetch_retries,
        )?
        .with_backoff(config.fetch_backoff()))
    } else {
        warn!("Live fetch disabled: serving stored draws only");
        Arc::new(OfflineSource)
    };

    let locate_policy = config.locate_policy();
    info!(
        "Source: {} (anchor {}, sync fetch {})",
        source.name(),
        locate_policy.cold_start_anchor,
        config.sync_fetch
    );

    // Background refresher keeps the store warm; requests only ever read the store.
    if config.live_fetch {
        Refresher::new(
            store.clone(),
            Arc::clone(&source),
            locate_policy,
            config.refresh_window,
            Duration::from_secs(config.refresh_interval_secs),
        )
        .spawn();
    }

    let state = AppState {
        store,
        source,
        latest_cache: TtlCache::new(Duration::from_secs(config.latest_cache_ttl_secs), 16),
        settings: ApiSettings::from_config(&config),
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
