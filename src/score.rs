//! Identity score packing and aggregation.
//!
//! Each epoch an identity's short session result is stored on chain as one
//! packed byte: the high nibble holds the points at half-point granularity
//! (0–7.5), the low nibble the number of flips counted (0–15). The packing is
//! consensus data and must be reproduced bit for bit.
//!
//! The cumulative score folds up to `LAST_SCORES_COUNT` packed epoch scores
//! together with the previous cumulative total, which decays linearly by 10%
//! per epoch in the history. Decay runs in decimal arithmetic so every node
//! derives identical totals.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::{
    MIN_FLIPS_FOR_HUMAN, MIN_FLIPS_FOR_VERIFIED, MIN_HUMAN_TOTAL_SCORE, MIN_TOTAL_SCORE,
};

/// Pack an epoch's (points, flips) pair into one byte.
///
/// `points * 2` is truncated to an integer and only its low 4 bits kept;
/// negative or NaN points pack as 0. Only the low 4 bits of `flips` are kept.
/// Out-of-range input truncates, it is never rejected.
pub fn encode_score(points: f32, flips: u32) -> u8 {
    let p = ((points * 2.0) as u8 & 0x0f) << 4;
    let q = (flips & 0x0f) as u8;
    p | q
}

/// Unpack a score byte into (points, flips).
pub fn decode_score(score: u8) -> (f32, u32) {
    let p = score >> 4;
    let q = score & 0x0f;
    (f32::from(p) / 2.0, u32::from(q))
}

/// A cumulative (points, flips) score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityScore {
    pub points: f32,
    pub flips: u32,
}

impl IdentityScore {
    pub fn new(points: f32, flips: u32) -> Self {
        IdentityScore { points, flips }
    }

    /// Points per flip, 0 when no flips were counted.
    pub fn ratio(&self) -> f32 {
        if self.flips == 0 {
            return 0.0;
        }
        self.points / self.flips as f32
    }

    /// Enough flips and a high enough ratio for the verified status.
    pub fn meets_verified_threshold(&self) -> bool {
        self.flips >= MIN_FLIPS_FOR_VERIFIED && self.ratio() >= MIN_TOTAL_SCORE
    }

    /// Enough flips and a high enough ratio for the human status.
    pub fn meets_human_threshold(&self) -> bool {
        self.flips >= MIN_FLIPS_FOR_HUMAN && self.ratio() >= MIN_HUMAN_TOTAL_SCORE
    }
}

/// Fold a packed score history into the previous cumulative total.
///
/// The prior total is scaled by `1 - 0.1 * history.len()`. Callers must keep
/// `history.len() <= LAST_SCORES_COUNT`; longer histories make the multiplier
/// negative and the flip total wraps, as with the fixed-width on-chain value.
pub fn aggregate_scores(history: &[u8], prior_points: f32, prior_flips: u32) -> IdentityScore {
    let mut sum_points: f32 = 0.0;
    let mut sum_flips: u32 = 0;
    for &score in history {
        let (points, flips) = decode_score(score);
        sum_points += points;
        sum_flips = sum_flips.wrapping_add(flips);
    }

    let multiplier = decay_multiplier(history.len());

    let add_points = match decimal_from_f32(prior_points).and_then(|p| p.checked_mul(multiplier)) {
        Some(scaled) => scaled.to_f64().unwrap_or(0.0),
        None => f64::from(prior_points) * multiplier.to_f64().unwrap_or(0.0),
    };
    let add_flips = Decimal::from(prior_flips)
        .checked_mul(multiplier)
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .unwrap_or(0);

    IdentityScore {
        points: sum_points + add_points as f32,
        flips: sum_flips.wrapping_add(add_flips as u32),
    }
}

/// `1 - 0.1 * len`, exact in decimal.
fn decay_multiplier(len: usize) -> Decimal {
    let decay = Decimal::new(1, 1) * Decimal::from(len as u64);
    Decimal::ONE - decay
}

/// Decimal value of the shortest decimal representation of `value`.
///
/// `None` for non-finite values or magnitudes beyond decimal range.
fn decimal_from_f32(value: f32) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}
