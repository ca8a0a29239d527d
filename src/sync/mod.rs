pub mod locator;
pub mod window;

pub use locator::{DrawLocator, LocatePolicy};
pub use window::{window_bounds, FillPolicy, WindowMaterializer};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::DrawStore;
use crate::lotto::DrawSource;

/// Outcome of one refresher pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub latest: u32,
    pub window_len: usize,
}

/// Background task that keeps the store warm: finds the newest draw with a
/// full scan and back-fills the most recent `window` draws.
///
/// It talks to request handlers only through the store.
pub struct Refresher {
    store: DrawStore,
    source: Arc<dyn DrawSource>,
    policy: LocatePolicy,
    window: u32,
    interval: Duration,
}

impl Refresher {
    pub fn new(
        store: DrawStore,
        source: Arc<dyn DrawSource>,
        policy: LocatePolicy,
        window: u32,
        interval: Duration,
    ) -> Self {
        Refresher {
            store,
            source,
            policy,
            window,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Loop forever. The first tick fires immediately so a fresh install gets
    /// data without waiting a whole interval.
    pub async fn run(self) {
        info!(
            "Draw refresher started (source={}, window={}, interval={:?})",
            self.source.name(),
            self.window,
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let summary = self.refresh_once().await;
            if summary.latest == 0 {
                warn!("Draw refresh found no draws upstream");
            } else {
                info!(
                    "Draw refresh: latest={}, {} draw(s) in the recent window",
                    summary.latest, summary.window_len
                );
            }
        }
    }

    pub async fn refresh_once(&self) -> RefreshSummary {
        let latest = DrawLocator::new(&self.store, self.source.as_ref(), self.policy)
            .scan_latest()
            .await;
        if latest == 0 {
            return RefreshSummary {
                latest,
                window_len: 0,
            };
        }

        let fill = FillPolicy::FetchMissing {
            max_fetches: self.window as usize,
        };
        let window = WindowMaterializer::new(&self.store, self.source.as_ref(), fill)
            .materialize(latest, self.window)
            .await;

        RefreshSummary {
            latest,
            window_len: window.len(),
        }
    }
}
