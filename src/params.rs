//! Network-size dependent protocol parameters.
//!
//! Every function here is pure and deterministic: all nodes must derive the
//! same session sizing and epoch length from the same identity count, or
//! they fork at the next epoch boundary.

use chrono::{DateTime, Datelike, Duration, TimeZone, Weekday};
use serde::Serialize;

use crate::constants::{
    FLIPS_PER_IDENTITY, LONG_EPOCH_THRESHOLD_DAYS, LONG_SESSION_TESTERS, MAX_EPOCH_DAYS,
    MAX_INVITE_QUOTA, MIN_INVITE_QUOTA, MIN_LONG_SESSION_FLIPS, OFF_WEEKDAY_EPOCH_DAYS,
    SHORT_SESSION_EXTRA_FLIPS, SHORT_SESSION_FLIPS,
};

/// Exponent of the network size in the epoch length formula.
const EPOCH_DURATION_EXPONENT: f64 = 0.33;

/// Weekday a long epoch must end on to be snapped to whole weeks.
const EPOCH_SNAP_WEEKDAY: Weekday = Weekday::Sat;

/// Base epoch sizing for a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkParams {
    /// Base epoch length in days.
    pub epoch_days: u32,
    /// Flips every identity must author.
    pub flips_per_identity: u32,
}

/// Base epoch length and per-identity flip quota for `network_size` identities.
///
/// An empty network gets a one-day epoch and no flips.
pub fn network_params(network_size: usize) -> NetworkParams {
    if network_size == 0 {
        return NetworkParams {
            epoch_days: 1,
            flips_per_identity: 0,
        };
    }
    NetworkParams {
        epoch_days: size_root(network_size).round() as u32,
        flips_per_identity: FLIPS_PER_IDENTITY,
    }
}

/// Flips shown to each identity in the short session.
pub fn short_session_flips_count() -> u32 {
    SHORT_SESSION_FLIPS
}

/// Extra flips shown in the short session.
pub fn short_session_extra_flips_count() -> u32 {
    SHORT_SESSION_EXTRA_FLIPS
}

/// Flips shown to each identity in the long session.
///
/// `flips_per_identity * network_size`, capped at
/// `flips_per_identity * LONG_SESSION_TESTERS` and never below
/// `MIN_LONG_SESSION_FLIPS` (the floor wins over the cap).
pub fn long_session_flips_count(network_size: usize) -> u32 {
    let flips_per_identity = u64::from(network_params(network_size).flips_per_identity);
    let total = flips_per_identity.saturating_mul(network_size as u64);
    let cap = flips_per_identity * u64::from(LONG_SESSION_TESTERS);
    total.min(cap).max(u64::from(MIN_LONG_SESSION_FLIPS)) as u32
}

/// Epoch length starting at `validation_time`.
///
/// Short epochs (under three weeks) use the base length. Longer epochs are
/// 20 days unless validation falls on a Saturday, in which case they snap to
/// the nearest multiple of three weeks, capped at four weeks. The weekday is
/// taken in `validation_time`'s own time zone.
pub fn normalized_epoch_duration<Tz: TimeZone>(
    validation_time: &DateTime<Tz>,
    network_size: usize,
) -> Duration {
    let base_days = i64::from(network_params(network_size).epoch_days);
    if base_days < LONG_EPOCH_THRESHOLD_DAYS {
        return Duration::days(base_days);
    }
    if validation_time.weekday() != EPOCH_SNAP_WEEKDAY {
        return Duration::days(OFF_WEEKDAY_EPOCH_DAYS);
    }
    let three_weeks = LONG_EPOCH_THRESHOLD_DAYS as f64;
    let snapped =
        (size_root(network_size) / three_weeks).round() as i64 * LONG_EPOCH_THRESHOLD_DAYS;
    Duration::days(snapped.min(MAX_EPOCH_DAYS))
}

/// Invites granted to the god address: a third of the network, clamped to
/// `[MIN_INVITE_QUOTA, MAX_INVITE_QUOTA]`.
pub fn invite_quota(network_size: usize) -> u16 {
    (network_size / 3).clamp(MIN_INVITE_QUOTA, MAX_INVITE_QUOTA) as u16
}

fn size_root(network_size: usize) -> f64 {
    (network_size as f64).powf(EPOCH_DURATION_EXPONENT)
}
