// src/rating/mod.rs

//! Elo-style bisection shared by the rating calculators.
//!
//! An opponent set is a list of `(weight, rating)` pairs. The expected score
//! of a rating `R` against it is `Σ w / (1 + 10^((R - r) / 400))`, which
//! falls as `R` grows, so the rating matching a target score is found by
//! bisection over the configured range.

pub mod country;
pub mod problem;

use std::collections::HashMap;

use crate::models::RatingConfig;

/// Aggregate probability at which the bisection stops at a range boundary.
const STOP_PROBABILITY: f64 = 0.95;

/// Probability that a player rated `opponent` beats one rated `rating`.
pub fn beat_probability(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating - opponent) / 400.0))
}

/// Weighted expected number of opponents beating `rating`.
pub fn expected_score(opponents: &[(f64, f64)], rating: f64) -> f64 {
    opponents
        .iter()
        .map(|(weight, opponent)| weight * beat_probability(rating, *opponent))
        .sum()
}

/// Expected scores evaluated for one opponent set, keyed by the rating's bits.
///
/// Reuse a cache only across calls sharing the exact same opponents.
#[derive(Debug, Default)]
pub struct RatingCache {
    scores: HashMap<u64, f64>,
    hits: usize,
}

impl RatingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Lookups answered without recomputation.
    pub fn hits(&self) -> usize {
        self.hits
    }

    fn score(&mut self, opponents: &[(f64, f64)], rating: f64) -> f64 {
        if let Some(score) = self.scores.get(&rating.to_bits()) {
            self.hits += 1;
            return *score;
        }
        let score = expected_score(opponents, rating);
        self.scores.insert(rating.to_bits(), score);
        score
    }
}

/// Search range and depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bisection {
    pub low: f64,
    pub high: f64,
    pub iterations: u32,
}

impl From<&RatingConfig> for Bisection {
    fn from(config: &RatingConfig) -> Self {
        Self {
            low: config.low,
            high: config.high,
            iterations: config.iterations,
        }
    }
}

/// Weighted log-probability that every opponent beats `rating`.
fn log_all_beat(opponents: &[(f64, f64)], rating: f64) -> f64 {
    opponents
        .iter()
        .map(|(weight, opponent)| weight * beat_probability(rating, *opponent).ln())
        .sum()
}

/// Weighted log-probability that no opponent beats `rating`.
fn log_none_beat(opponents: &[(f64, f64)], rating: f64) -> f64 {
    opponents
        .iter()
        .map(|(weight, opponent)| weight * (1.0 - beat_probability(rating, *opponent)).ln())
        .sum()
}

/// Rating whose expected score against `opponents` equals `target`.
pub fn get_weighted_rating(
    opponents: &[(f64, f64)],
    target: f64,
    range: &Bisection,
    cache: &mut RatingCache,
) -> f64 {
    let (mut lo, mut hi) = (range.low, range.high);
    if opponents.is_empty() {
        return lo;
    }

    let threshold = STOP_PROBABILITY.ln();
    if log_all_beat(opponents, hi) >= threshold {
        return hi;
    }
    if log_none_beat(opponents, lo) >= threshold {
        return lo;
    }
    if target >= cache.score(opponents, lo) {
        return lo;
    }
    if target <= cache.score(opponents, hi) {
        return hi;
    }

    for _ in 0..range.iterations {
        let mid = (lo + hi) / 2.0;
        if cache.score(opponents, mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> Bisection {
        Bisection::from(&RatingConfig::default())
    }

    #[test]
    fn test_self_comparison_converges() {
        let mut cache = RatingCache::new();
        let rating = get_weighted_rating(&[(1.0, 1500.0)], 0.5, &range(), &mut cache);
        assert!((rating - 1500.0).abs() <= 1.0, "{rating}");
    }

    #[test]
    fn test_target_monotonicity() {
        let opponents = [(1.0, 1200.0), (1.0, 1600.0), (0.5, 2000.0)];
        let mut cache = RatingCache::new();
        let easy = get_weighted_rating(&opponents, 2.0, &range(), &mut cache);
        let hard = get_weighted_rating(&opponents, 0.5, &range(), &mut cache);
        assert!(easy < hard);
    }

    #[test]
    fn test_boundaries() {
        let opponents = [(1.0, 1500.0), (1.0, 1700.0)];
        let mut cache = RatingCache::new();
        assert_eq!(get_weighted_rating(&opponents, 2.0, &range(), &mut cache), 0.0);
        assert_eq!(get_weighted_rating(&opponents, 0.0, &range(), &mut cache), 5000.0);
        assert_eq!(get_weighted_rating(&[], 1.0, &range(), &mut cache), 0.0);
    }

    #[test]
    fn test_population_far_above_range() {
        let opponents = [(1.0, 9000.0), (1.0, 9500.0)];
        let mut cache = RatingCache::new();
        assert_eq!(get_weighted_rating(&opponents, 1.0, &range(), &mut cache), 5000.0);
    }

    #[test]
    fn test_cache_reuses_midpoints() {
        let opponents = [(1.0, 1400.0), (1.0, 1800.0)];
        let mut cache = RatingCache::new();
        get_weighted_rating(&opponents, 1.0, &range(), &mut cache);
        let evaluated = cache.len();
        get_weighted_rating(&opponents, 1.0, &range(), &mut cache);
        assert_eq!(cache.len(), evaluated);
        assert!(cache.hits() >= evaluated);
    }
}
