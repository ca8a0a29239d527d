pub mod frequency;
pub mod scoring;
pub mod strategy;

pub use frequency::{range_frequency, FrequencyTable, RangeSummary};
pub use strategy::{score_strategies, ScorerConfig, StrategyReport};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Reproducible RNG when a seed is given, OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
