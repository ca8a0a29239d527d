use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::models::{DrawRecord, MAX_NUMBER, MIN_NUMBER};

/// Numbers per frequency tier (45 numbers split three ways).
pub const TIER_SIZE: usize = 15;

/// Buckets reported by `/api/range_freq`, inclusive bounds.
pub const RANGE_BUCKETS: [(&str, u8, u8); 5] = [
    ("1-10", 1, 10),
    ("11-20", 11, 20),
    ("21-30", 21, 30),
    ("31-40", 31, 40),
    ("41-45", 41, 45),
];

/// How often each number 1..=45 appeared in a window of draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    /// Index 0 unused
    counts: [u32; MAX_NUMBER as usize + 1],
}

impl Default for FrequencyTable {
    fn default() -> Self {
        FrequencyTable {
            counts: [0; MAX_NUMBER as usize + 1],
        }
    }
}

impl FrequencyTable {
    /// Count main numbers (not bonus balls) across `draws`.
    pub fn from_draws(draws: &[DrawRecord]) -> Self {
        let mut table = Self::default();
        for draw in draws {
            for &n in &draw.numbers {
                table.counts[n as usize] += 1;
            }
        }
        table
    }

    /// Build from explicit `(number, count)` pairs; numbers outside 1..=45 are ignored.
    pub fn from_counts(pairs: impl IntoIterator<Item = (u8, u32)>) -> Self {
        let mut table = Self::default();
        for (n, c) in pairs {
            if (MIN_NUMBER..=MAX_NUMBER).contains(&n) {
                table.counts[n as usize] = c;
            }
        }
        table
    }

    pub fn count(&self, n: u8) -> u32 {
        self.counts.get(n as usize).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        (MIN_NUMBER..=MAX_NUMBER).map(move |n| (n, self.count(n)))
    }

    /// Numbers ordered by count descending (ties by number ascending), split
    /// into top / middle / low tiers of `TIER_SIZE`.
    pub fn tiers(&self) -> [Vec<u8>; 3] {
        let mut ranked: Vec<(u8, u32)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let ranked: Vec<u8> = ranked.into_iter().map(|(n, _)| n).collect();
        let mut chunks = ranked.chunks(TIER_SIZE).map(<[u8]>::to_vec);
        [
            chunks.next().unwrap_or_default(),
            chunks.next().unwrap_or_default(),
            chunks.next().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeBucket {
    pub label: &'static str,
    pub total: u32,
    /// number → count, serialised with string keys
    pub counts: BTreeMap<u8, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeSummary {
    pub ranges: Vec<RangeBucket>,
    /// The two buckets with the most hits
    pub top_ranges: Vec<&'static str>,
    /// The bucket with the fewest hits
    pub bottom_range: &'static str,
}

/// Per-bucket counts plus the strongest and weakest buckets.
/// Ties keep bucket order.
pub fn range_frequency(table: &FrequencyTable) -> RangeSummary {
    let ranges: Vec<RangeBucket> = RANGE_BUCKETS
        .iter()
        .map(|&(label, lo, hi)| {
            let counts: BTreeMap<u8, u32> = (lo..=hi).map(|n| (n, table.count(n))).collect();
            RangeBucket {
                label,
                total: counts.values().sum(),
                counts,
            }
        })
        .collect();

    let mut by_strength: Vec<&RangeBucket> = ranges.iter().collect();
    by_strength.sort_by(|a, b| b.total.cmp(&a.total));

    let top_ranges = by_strength.iter().take(2).map(|b| b.label).collect();
    let bottom_range = by_strength.last().map(|b| b.label).unwrap_or(RANGE_BUCKETS[4].0);

    RangeSummary {
        ranges,
        top_ranges,
        bottom_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(no: u32, numbers: [i64; 6]) -> DrawRecord {
        DrawRecord::new(no, numbers, Some(45), None).unwrap()
    }

    #[test]
    fn test_counts_main_numbers_only() {
        let draws = vec![
            draw(1, [1, 2, 3, 4, 5, 6]),
            draw(2, [1, 10, 20, 30, 40, 44]),
        ];
        let t = FrequencyTable::from_draws(&draws);
        assert_eq!(t.count(1), 2);
        assert_eq!(t.count(44), 1);
        assert_eq!(t.count(45), 0);
        assert_eq!(t.iter().map(|(_, c)| c).sum::<u32>(), 12);
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let t = FrequencyTable::from_draws(&[]);
        assert!(t.iter().all(|(_, c)| c == 0));
        assert_eq!(t.iter().count(), 45);
    }

    #[test]
    fn test_out_of_range_lookups_are_zero() {
        let t = FrequencyTable::from_counts([(0, 5), (46, 5), (7, 3)]);
        assert_eq!(t.count(0), 0);
        assert_eq!(t.count(46), 0);
        assert_eq!(t.count(7), 3);
        assert_eq!(t.iter().map(|(_, c)| c).sum::<u32>(), 3);
    }

    #[test]
    fn test_tiers_rank_by_count_then_number() {
        let t = FrequencyTable::from_counts([(40, 9), (2, 9), (33, 4)]);
        let [top, mid, low] = t.tiers();
        assert_eq!(&top[..4], &[2, 40, 33, 1]);
        assert_eq!(top.len(), 15);
        assert_eq!(mid.len(), 15);
        assert_eq!(low.len(), 15);
        assert_eq!(*low.last().unwrap(), 45);

        let mut all: Vec<u8> = top.into_iter().chain(mid).chain(low).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=45).collect::<Vec<u8>>());
    }

    #[test]
    fn test_range_frequency_buckets() {
        let draws = vec![
            draw(1, [1, 2, 3, 11, 21, 41]),
            draw(2, [4, 5, 12, 22, 31, 45]),
        ];
        let summary = range_frequency(&FrequencyTable::from_draws(&draws));
        let totals: Vec<(&str, u32)> = summary.ranges.iter().map(|b| (b.label, b.total)).collect();
        assert_eq!(
            totals,
            vec![("1-10", 5), ("11-20", 2), ("21-30", 2), ("31-40", 1), ("41-45", 2)]
        );
        assert_eq!(summary.ranges[4].counts.len(), 5);
        assert_eq!(summary.ranges[0].counts[&3], 1);
        assert_eq!(summary.top_ranges, vec!["1-10", "11-20"]);
        assert_eq!(summary.bottom_range, "31-40");
    }

    #[test]
    fn test_range_frequency_serialises_string_keys() {
        let summary = range_frequency(&FrequencyTable::from_counts([(7, 2)]));
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["ranges"][0]["counts"]["7"], 2);
        assert_eq!(v["top_ranges"][0], "1-10");
    }
}
