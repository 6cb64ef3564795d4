//! Elo rating engine.
//!
//! [`update`] is pure and may be recomputed freely. Applying its result is the
//! caller's business and happens at most once per match, guarded by the match
//! ledger's insert-once write.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use matchgate_types::{GameOutcome, RatingUpdate};
use serde::{Deserialize, Serialize};

/// Default K-factor.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rating assigned to every new player.
pub const DEFAULT_INITIAL_RATING: f64 = 1500.0;

/// Engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloParams {
    pub k_factor: f64,
}

impl Default for EloParams {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
        }
    }
}

fn strength(rating: f64) -> f64 {
    10f64.powf(rating / 400.0)
}

/// Expected scores for both sides. The pair always sums to 1.
pub fn expected_scores(ratings: [f64; 2]) -> [f64; 2] {
    let q = [strength(ratings[0]), strength(ratings[1])];
    let denom = q[0] + q[1];
    [q[0] / denom, q[1] / denom]
}

/// Compute new ratings from two ratings and the two observed scores.
///
/// Scores are usually 1/0/0.5 but any real pair is accepted. The result is
/// not truncated; see [`settle`] for the persisted form.
pub fn update(ratings: [f64; 2], scores: [f64; 2], k: f64) -> [f64; 2] {
    let expected = expected_scores(ratings);
    [
        ratings[0] + k * (scores[0] - expected[0]),
        ratings[1] + k * (scores[1] - expected[1]),
    ]
}

/// Truncate a computed rating to the integral value that gets persisted.
pub fn truncate(rating: f64) -> f64 {
    rating.trunc()
}

/// Rating updates to persist for a decided match.
///
/// `ratings` is indexed like `outcome.players`.
pub fn settle(outcome: &GameOutcome, ratings: [f64; 2], params: EloParams) -> [RatingUpdate; 2] {
    let next = update(ratings, outcome.scores, params.k_factor);
    [
        RatingUpdate {
            pid: outcome.players[0],
            rating: truncate(next[0]),
        },
        RatingUpdate {
            pid: outcome.players[1],
            rating: truncate(next[1]),
        },
    ]
}
