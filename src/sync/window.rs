use futures_util::future::join_all;
use tracing::debug;

use crate::db::models::DrawRecord;
use crate::db::DrawStore;
use crate::lotto::DrawSource;

/// Whether a window may reach out to the remote source for missing draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Only what the store already has.
    StoreOnly,
    /// Fetch up to `max_fetches` missing draws concurrently, newest first.
    FetchMissing { max_fetches: usize },
}

/// First and last draw number of the window ending at `end_no` with `n` draws.
pub fn window_bounds(end_no: u32, n: u32) -> Option<(u32, u32)> {
    if end_no == 0 || n == 0 {
        return None;
    }
    let start = end_no.saturating_sub(n - 1).max(1);
    Some((start, end_no))
}

/// Builds the ordered run of draws `[end_no - n + 1, end_no]` from the store,
/// optionally filling gaps from the remote source.
pub struct WindowMaterializer<'a> {
    store: &'a DrawStore,
    source: &'a dyn DrawSource,
    policy: FillPolicy,
}

impl<'a> WindowMaterializer<'a> {
    pub fn new(store: &'a DrawStore, source: &'a dyn DrawSource, policy: FillPolicy) -> Self {
        WindowMaterializer {
            store,
            source,
            policy,
        }
    }

    /// Draws in the window, ascending by draw number. Partial (or empty) when
    /// draws are neither stored nor fetchable.
    pub async fn materialize(&self, end_no: u32, n: u32) -> Vec<DrawRecord> {
        let Some((start, end)) = window_bounds(end_no, n) else {
            return Vec::new();
        };

        let stored = self.store.read_all();
        let mut window: Vec<DrawRecord> = stored
            .range(start..=end)
            .map(|(_, d)| d.clone())
            .collect();

        if let FillPolicy::FetchMissing { max_fetches } = self.policy {
            let missing: Vec<u32> = (start..=end)
                .rev()
                .filter(|no| !stored.contains_key(no))
                .take(max_fetches)
                .collect();

            if !missing.is_empty() {
                let fetched: Vec<DrawRecord> =
                    join_all(missing.iter().map(|no| self.source.fetch(*no)))
                        .await
                        .into_iter()
                        .flatten()
                        .filter(|d| (start..=end).contains(&d.draw_no))
                        .collect();
                debug!(
                    "Window {}..={}: {} missing, {} fetched from {}",
                    start,
                    end,
                    missing.len(),
                    fetched.len(),
                    self.source.name()
                );
                if !fetched.is_empty() {
                    self.store.upsert_many(fetched.iter().cloned());
                    window.extend(fetched);
                }
            }
        }

        window.sort_by_key(|d| d.draw_no);
        window.dedup_by_key(|d| d.draw_no);
        window
    }
}
