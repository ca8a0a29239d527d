use async_trait::async_trait;

use crate::db::models::DrawRecord;

/// Anything that can look up a single draw by number.
#[async_trait]
pub trait DrawSource: Send + Sync {
    /// Fetch one draw. `None` covers every failure: not drawn yet, network
    /// error, timeout or a malformed payload.
    async fn fetch(&self, draw_no: u32) -> Option<DrawRecord>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Source used when live fetching is disabled: never finds anything.
pub struct OfflineSource;

#[async_trait]
impl DrawSource for OfflineSource {
    async fn fetch(&self, _draw_no: u32) -> Option<DrawRecord> {
        None
    }

    fn name(&self) -> &str {
        "offline"
    }
}
