use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::frequency::FrequencyTable;
use super::scoring::{evaluate, rationale, Metrics};
use crate::db::models::{DrawRecord, MAX_NUMBER, MIN_NUMBER, PICK_COUNT};

/// Risk profile that decides which frequency tier a candidate leans on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Conservative,
    Balanced,
    #[serde(rename = "High-Risk")]
    HighRisk,
}

/// How a strategy builds one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    /// Numbers taken from the top / middle / low tier
    pub quotas: [usize; 3],
    /// Chance that each pick is swapped for a uniformly random unused number
    pub substitution: f64,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Conservative, Strategy::Balanced, Strategy::HighRisk];

    pub fn label(self) -> &'static str {
        match self {
            Strategy::Conservative => "Conservative",
            Strategy::Balanced => "Balanced",
            Strategy::HighRisk => "High-Risk",
        }
    }

    pub fn korean_label(self) -> &'static str {
        match self {
            Strategy::Conservative => "보수형",
            Strategy::Balanced => "균형형",
            Strategy::HighRisk => "고위험형",
        }
    }

    pub fn profile(self) -> Profile {
        match self {
            Strategy::Conservative => Profile {
                quotas: [4, 2, 0],
                substitution: 0.0,
            },
            Strategy::Balanced => Profile {
                quotas: [2, 2, 2],
                substitution: 0.1,
            },
            Strategy::HighRisk => Profile {
                quotas: [1, 1, 4],
                substitution: 0.35,
            },
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One scored suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSet {
    pub strategy: Strategy,
    pub name_ko: &'static str,
    pub numbers: [u8; PICK_COUNT],
    #[serde(flatten)]
    pub metrics: Metrics,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorerConfig {
    /// Candidates kept per strategy
    pub top_k: usize,
    /// Distinct candidates generated per strategy before ranking
    pub pool_size: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            top_k: 5,
            pool_size: 64,
        }
    }
}

/// Size of the pooled cross-strategy ranking.
pub const BEST_OVERALL: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    /// Top-K per strategy, score descending
    pub by_strategy: BTreeMap<Strategy, Vec<CandidateSet>>,
    /// Best candidate of each strategy, score descending
    pub best_per_strategy: Vec<CandidateSet>,
    /// Best candidates across all strategies
    pub best_overall: Vec<CandidateSet>,
    /// Strategy owning the single best candidate
    pub best_strategy: Option<Strategy>,
}

/// Score all three strategies against a window of draws. An empty window
/// gives an all-zero table and still produces a well-formed report.
pub fn score_strategies<R: Rng + ?Sized>(
    window: &[DrawRecord],
    cfg: &ScorerConfig,
    rng: &mut R,
) -> StrategyReport {
    let table = FrequencyTable::from_draws(window);
    score_frequency(&table, window.len(), cfg, rng)
}

/// Same as `score_strategies`, for a table that is already built.
/// `draws` is the window length, used only for the rationale text.
pub fn score_frequency<R: Rng + ?Sized>(
    table: &FrequencyTable,
    draws: usize,
    cfg: &ScorerConfig,
    rng: &mut R,
) -> StrategyReport {
    let tiers = table.tiers();

    let mut by_strategy = BTreeMap::new();
    for strategy in Strategy::ALL {
        let mut ranked: Vec<CandidateSet> = generate_pool(strategy, &tiers, table, cfg.pool_size, rng)
            .into_iter()
            .map(|numbers| CandidateSet {
                strategy,
                name_ko: strategy.korean_label(),
                numbers,
                metrics: evaluate(&numbers, table),
                rationale: rationale(&numbers, table, draws),
            })
            .collect();
        rank(&mut ranked);
        ranked.truncate(cfg.top_k);
        by_strategy.insert(strategy, ranked);
    }

    let mut best_per_strategy: Vec<CandidateSet> = by_strategy
        .values()
        .filter_map(|sets| sets.first().cloned())
        .collect();
    rank(&mut best_per_strategy);

    let mut best_overall: Vec<CandidateSet> = by_strategy.values().flatten().cloned().collect();
    rank(&mut best_overall);
    let mut seen = HashSet::new();
    best_overall.retain(|c| seen.insert(c.numbers));
    best_overall.truncate(BEST_OVERALL);

    let best_strategy = best_per_strategy.first().map(|c| c.strategy);

    StrategyReport {
        by_strategy,
        best_per_strategy,
        best_overall,
        best_strategy,
    }
}

/// Score descending, ties broken by the numbers so the order is stable.
fn rank(sets: &mut [CandidateSet]) {
    sets.sort_by(|a, b| {
        b.metrics
            .score
            .total_cmp(&a.metrics.score)
            .then_with(|| a.numbers.cmp(&b.numbers))
    });
}

/// Up to `pool_size` distinct candidates. Stops early once the attempt
/// budget runs out, so a strategy can come back with fewer (or none).
pub fn generate_pool<R: Rng + ?Sized>(
    strategy: Strategy,
    tiers: &[Vec<u8>; 3],
    table: &FrequencyTable,
    pool_size: usize,
    rng: &mut R,
) -> Vec<[u8; PICK_COUNT]> {
    let profile = strategy.profile();
    let budget = pool_size.saturating_mul(20);

    let mut seen = HashSet::with_capacity(pool_size);
    let mut pool = Vec::with_capacity(pool_size);
    for _ in 0..budget {
        if pool.len() >= pool_size {
            break;
        }
        if let Some(candidate) = draw_candidate(&profile, tiers, table, rng) {
            if seen.insert(candidate) {
                pool.push(candidate);
            }
        }
    }
    pool
}

/// One ascending candidate drawn under `profile`, or `None` if the tiers
/// could not supply six distinct numbers.
pub fn draw_candidate<R: Rng + ?Sized>(
    profile: &Profile,
    tiers: &[Vec<u8>; 3],
    table: &FrequencyTable,
    rng: &mut R,
) -> Option<[u8; PICK_COUNT]> {
    let mut picked: Vec<u8> = Vec::with_capacity(PICK_COUNT);
    for (tier, &quota) in tiers.iter().zip(profile.quotas.iter()) {
        let available: Vec<u8> = tier.iter().copied().filter(|n| !picked.contains(n)).collect();
        picked.extend(sample_weighted(available, quota, table, rng));
    }

    for slot in 0..picked.len() {
        if profile.substitution > 0.0 && rng.gen_bool(profile.substitution) {
            let unused: Vec<u8> = (MIN_NUMBER..=MAX_NUMBER)
                .filter(|n| !picked.contains(n))
                .collect();
            if let Some(&n) = unused.choose(rng) {
                picked[slot] = n;
            }
        }
    }

    picked.sort_unstable();
    picked.dedup();
    picked.as_slice().try_into().ok()
}

/// Sample `count` numbers without replacement, weighted by `count + 1`
/// so numbers never seen in the window can still come up.
fn sample_weighted<R: Rng + ?Sized>(
    mut available: Vec<u8>,
    count: usize,
    table: &FrequencyTable,
    rng: &mut R,
) -> Vec<u8> {
    let mut selected = Vec::with_capacity(count);
    for _ in 0..count {
        let weights: Vec<u32> = available.iter().map(|&n| table.count(n) + 1).collect();
        let Ok(dist) = WeightedIndex::new(&weights) else {
            break;
        };
        let idx = dist.sample(rng);
        selected.push(available.swap_remove(idx));
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picker::rng_from_seed;

    fn is_valid(numbers: &[u8; PICK_COUNT]) -> bool {
        numbers.windows(2).all(|p| p[0] < p[1])
            && numbers.iter().all(|n| (MIN_NUMBER..=MAX_NUMBER).contains(n))
    }

    #[test]
    fn test_uniform_window_metrics_are_finite_and_non_negative() {
        let table = FrequencyTable::from_counts((1..=45).map(|n| (n, 4)));
        let mut rng = rng_from_seed(Some(11));
        let report = score_frequency(&table, 30, &ScorerConfig::default(), &mut rng);

        for strategy in Strategy::ALL {
            let sets = &report.by_strategy[&strategy];
            assert_eq!(sets.len(), 5, "{} came back short", strategy);
            for c in sets {
                assert!(is_valid(&c.numbers));
                assert_eq!(c.strategy, strategy);
                for v in [c.metrics.reward, c.metrics.risk, c.metrics.score] {
                    assert!(v.is_finite() && v >= 0.0);
                }
            }
            assert!(sets.windows(2).all(|p| p[0].metrics.score >= p[1].metrics.score));
        }
    }

    #[test]
    fn test_empty_window_still_produces_report() {
        let mut rng = rng_from_seed(Some(3));
        let report = score_strategies(&[], &ScorerConfig::default(), &mut rng);

        assert_eq!(report.by_strategy.len(), 3);
        assert_eq!(report.best_per_strategy.len(), 3);
        assert!(report.best_overall.len() <= BEST_OVERALL);
        assert!(report.best_strategy.is_some());
        assert!(report
            .best_overall
            .iter()
            .all(|c| c.metrics.reward == 0.0 && c.metrics.score == 0.0));
    }

    #[test]
    fn test_single_hot_number_leads_conservative() {
        // Number 7 in each of 10 draws, nothing else
        let table = FrequencyTable::from_counts([(7, 10)]);
        assert_eq!(crate::picker::scoring::reward(&[7; 6], &table), 10.0);

        let mut rng = rng_from_seed(Some(42));
        let report = score_frequency(&table, 10, &ScorerConfig::default(), &mut rng);
        let top = &report.by_strategy[&Strategy::Conservative][0];
        assert!(top.numbers.contains(&7), "top pick {:?}", top.numbers);
        assert!(top.metrics.reward > 0.0);
    }

    #[test]
    fn test_conservative_draws_from_upper_tiers() {
        let table = FrequencyTable::from_counts((1..=45).map(|n| (n, u32::from(n))));
        let tiers = table.tiers();
        let mut rng = rng_from_seed(Some(5));
        let pool = generate_pool(Strategy::Conservative, &tiers, &table, 40, &mut rng);

        assert!(!pool.is_empty());
        for numbers in &pool {
            let top = numbers.iter().filter(|n| tiers[0].contains(n)).count();
            let mid = numbers.iter().filter(|n| tiers[1].contains(n)).count();
            assert_eq!((top, mid), (4, 2), "{:?}", numbers);
        }
    }

    #[test]
    fn test_pool_is_distinct_and_bounded() {
        let table = FrequencyTable::default();
        let tiers = table.tiers();
        let mut rng = rng_from_seed(Some(9));
        let pool = generate_pool(Strategy::HighRisk, &tiers, &table, 30, &mut rng);

        assert!(pool.len() <= 30);
        let distinct: HashSet<_> = pool.iter().collect();
        assert_eq!(distinct.len(), pool.len());
        assert!(pool.iter().all(is_valid));
    }

    #[test]
    fn test_zero_pool_size_gives_empty_strategy() {
        let cfg = ScorerConfig {
            top_k: 5,
            pool_size: 0,
        };
        let mut rng = rng_from_seed(Some(1));
        let report = score_strategies(&[], &cfg, &mut rng);
        assert!(report.by_strategy.values().all(Vec::is_empty));
        assert!(report.best_overall.is_empty());
        assert_eq!(report.best_strategy, None);
    }

    #[test]
    fn test_same_seed_same_report() {
        let table = FrequencyTable::from_counts((1..=45).map(|n| (n, u32::from(n % 7))));
        let a = score_frequency(&table, 20, &ScorerConfig::default(), &mut rng_from_seed(Some(77)));
        let b = score_frequency(&table, 20, &ScorerConfig::default(), &mut rng_from_seed(Some(77)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_best_overall_is_ranked_and_distinct() {
        let table = FrequencyTable::from_counts((1..=45).map(|n| (n, u32::from(n % 5) * 3)));
        let mut rng = rng_from_seed(Some(8));
        let report = score_frequency(&table, 15, &ScorerConfig::default(), &mut rng);

        assert_eq!(report.best_overall.len(), BEST_OVERALL);
        assert!(report
            .best_overall
            .windows(2)
            .all(|p| p[0].metrics.score >= p[1].metrics.score));
        let distinct: HashSet<_> = report.best_overall.iter().map(|c| c.numbers).collect();
        assert_eq!(distinct.len(), BEST_OVERALL);
        assert_eq!(report.best_strategy, Some(report.best_per_strategy[0].strategy));
        assert_eq!(report.best_overall[0].metrics.score, report.best_per_strategy[0].metrics.score);
    }

    #[test]
    fn test_strategy_serialises_with_display_labels() {
        let v = serde_json::to_value(Strategy::HighRisk).unwrap();
        assert_eq!(v, "High-Risk");
        let parsed: Strategy = serde_json::from_str("\"Conservative\"").unwrap();
        assert_eq!(parsed, Strategy::Conservative);
    }
}
