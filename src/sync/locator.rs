use tracing::debug;

use crate::db::DrawStore;
use crate::lotto::DrawSource;

/// Bounds for every probing strategy. Request paths only ever use `locate`,
/// whose cost is capped by `forward_probes` / `cold_start_probes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatePolicy {
    /// Draws past the newest stored one that `locate` may probe
    pub forward_probes: u32,
    /// Rough guess of the current draw number, used when the store is empty
    pub cold_start_anchor: u32,
    /// Draws at and below the anchor that `locate` may probe on a cold start
    pub cold_start_probes: u32,
    /// Step doublings `scan_latest` may take before giving up on finding an end
    pub max_doublings: u32,
}

impl Default for LocatePolicy {
    fn default() -> Self {
        LocatePolicy {
            forward_probes: 5,
            cold_start_anchor: 0,
            cold_start_probes: 8,
            max_doublings: 16,
        }
    }
}

/// Finds the newest published draw number by probing a `DrawSource`.
/// Every draw it finds on the way is upserted into the store.
pub struct DrawLocator<'a> {
    store: &'a DrawStore,
    source: &'a dyn DrawSource,
    policy: LocatePolicy,
}

impl<'a> DrawLocator<'a> {
    pub fn new(store: &'a DrawStore, source: &'a dyn DrawSource, policy: LocatePolicy) -> Self {
        DrawLocator {
            store,
            source,
            policy,
        }
    }

    /// Bounded lookup for request handlers. Returns 0 if nothing was found.
    pub async fn locate(&self) -> u32 {
        let known = self.store.max_draw_no();
        if known > 0 {
            self.probe_forward(known).await
        } else {
            self.probe_cold_start().await
        }
    }

    /// Walk `known+1, known+2, ...` and stop at the first miss.
    async fn probe_forward(&self, known: u32) -> u32 {
        let mut latest = known;
        for offset in 1..=self.policy.forward_probes {
            let Some(no) = known.checked_add(offset) else {
                break;
            };
            if !self.probe(no).await {
                break;
            }
            latest = no;
        }
        if latest > known {
            debug!("Located draw {} ({} newer than stored)", latest, latest - known);
        }
        latest
    }

    /// Walk down from the anchor and return the first draw that exists.
    async fn probe_cold_start(&self) -> u32 {
        let anchor = self.policy.cold_start_anchor;
        for step in 0..self.policy.cold_start_probes {
            let no = match anchor.checked_sub(step) {
                Some(n) if n > 0 => n,
                _ => break,
            };
            if self.probe(no).await {
                debug!("Cold start found draw {} (anchor {})", no, anchor);
                return no;
            }
        }
        0
    }

    /// Unbounded-distance search for the background refresher: gallop upward
    /// from the best known floor, doubling the step while draws exist, then
    /// binary-search between the last hit and the first miss.
    pub async fn scan_latest(&self) -> u32 {
        let mut floor = self.store.max_draw_no();
        if floor == 0 {
            let anchor = self.policy.cold_start_anchor;
            if anchor > 0 && self.probe(anchor).await {
                floor = anchor;
            }
        }

        let mut lo = floor;
        let mut step = 1u32;
        let mut miss = None;
        for _ in 0..=self.policy.max_doublings {
            let Some(no) = lo.checked_add(step) else {
                break;
            };
            if self.probe(no).await {
                lo = no;
                step = step.saturating_mul(2);
            } else {
                miss = Some(no);
                break;
            }
        }

        let Some(mut hi) = miss else {
            return lo;
        };
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.probe(mid).await {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        debug!("Scan settled on draw {} (floor {})", lo, floor);
        lo
    }

    async fn probe(&self, draw_no: u32) -> bool {
        match self.source.fetch(draw_no).await {
            Some(record) => {
                self.store.upsert(record);
                true
            }
            None => false,
        }
    }
}
