pub mod cache;
pub mod client;
pub mod source;

pub use cache::TtlCache;
pub use client::LottoApiClient;
pub use source::{DrawSource, OfflineSource};
