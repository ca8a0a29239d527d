//! Reward / risk scoring for a candidate set of numbers.
//!
//! For a set `S` scored against a frequency table `f`:
//!   reward = mean(f[n] for n in S)
//!   risk   = var(S) / 100 + adjacency(S)
//!   score  = reward / (1 + risk)
//! where `var` is the population variance of the numbers themselves and
//! `adjacency` charges every consecutive pair of the ascending set by its gap.
//!
//! Higher score is more favoured. Every value is finite and non-negative.
use serde::Serialize;

use super::frequency::FrequencyTable;

/// Scales the spread of a set into the same order of magnitude as the penalty.
pub const VARIANCE_DIVISOR: f64 = 100.0;
/// Charge for two numbers one apart (e.g. 12, 13).
pub const ADJACENT_PENALTY: f64 = 0.8;
/// Charge for two numbers two apart (e.g. 12, 14).
pub const NEAR_PENALTY: f64 = ADJACENT_PENALTY / 2.0;

/// Keeps `rr` finite when risk is zero.
const RR_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub reward: f64,
    pub risk: f64,
    pub score: f64,
    /// reward / risk
    pub rr: f64,
    /// Display gauge in 5..=95
    pub win: f64,
}

/// Mean historical count of the numbers in `numbers`. `0.0` for an empty set.
pub fn reward(numbers: &[u8], table: &FrequencyTable) -> f64 {
    if numbers.is_empty() {
        return 0.0;
    }
    let sum: u64 = numbers.iter().map(|&n| u64::from(table.count(n))).sum();
    sum as f64 / numbers.len() as f64
}

/// Population variance of the numbers themselves.
pub fn variance(numbers: &[u8]) -> f64 {
    if numbers.is_empty() {
        return 0.0;
    }
    let len = numbers.len() as f64;
    let mean = numbers.iter().map(|&n| f64::from(n)).sum::<f64>() / len;
    numbers
        .iter()
        .map(|&n| (f64::from(n) - mean).powi(2))
        .sum::<f64>()
        / len
}

/// Sum of gap charges over neighbouring pairs. `numbers` must be ascending.
pub fn adjacency_penalty(numbers: &[u8]) -> f64 {
    numbers
        .windows(2)
        .map(|pair| match pair[1].saturating_sub(pair[0]) {
            1 => ADJACENT_PENALTY,
            2 => NEAR_PENALTY,
            _ => 0.0,
        })
        .sum()
}

pub fn risk(numbers: &[u8]) -> f64 {
    variance(numbers) / VARIANCE_DIVISOR + adjacency_penalty(numbers)
}

pub fn score(reward: f64, risk: f64) -> f64 {
    reward / (1.0 + risk)
}

/// Every metric for one ascending candidate set.
pub fn evaluate(numbers: &[u8], table: &FrequencyTable) -> Metrics {
    let reward = reward(numbers, table);
    let risk = risk(numbers);
    let score = score(reward, risk);
    Metrics {
        reward,
        risk,
        score,
        rr: reward / (risk + RR_EPSILON),
        win: (score * 100.0 / (reward + 1.0)).clamp(5.0, 95.0),
    }
}

/// Per-number explanation, e.g. `"07/10/100.0% | 12/3/30.0%"`: number, count
/// in the window, and share of the window's draws that contained it.
pub fn rationale(numbers: &[u8], table: &FrequencyTable, draws: usize) -> String {
    numbers
        .iter()
        .map(|&n| {
            let count = table.count(n);
            let share = if draws == 0 {
                0.0
            } else {
                f64::from(count) * 100.0 / draws as f64
            };
            format!("{:02}/{}/{:.1}%", n, count, share)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
