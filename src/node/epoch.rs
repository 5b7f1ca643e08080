//! Epoch rollover: collect the epoch's flip keys and schedule the next
//! validation from the updated network size.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flip_key::FlipKey;
use crate::node::keys_pool::KeysPool;
use crate::node::validation::EpochHead;
use crate::params;

/// Session sizing and timing of the next validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpochSchedule {
    pub network_size: usize,
    pub flips_per_identity: u32,
    pub short_session_flips: u32,
    pub short_session_extra_flips: u32,
    pub long_session_flips: u32,
    pub invite_quota: u16,
    pub epoch_days: i64,
    pub next_validation: DateTime<Utc>,
}

impl EpochSchedule {
    /// Schedule the epoch that starts with the validation at `validation_time`.
    ///
    /// The next validation saturates at the latest representable time.
    pub fn compute(validation_time: DateTime<Utc>, network_size: usize) -> Self {
        let duration = params::normalized_epoch_duration(&validation_time, network_size);
        EpochSchedule {
            network_size,
            flips_per_identity: params::network_params(network_size).flips_per_identity,
            short_session_flips: params::short_session_flips_count(),
            short_session_extra_flips: params::short_session_extra_flips_count(),
            long_session_flips: params::long_session_flips_count(network_size),
            invite_quota: params::invite_quota(network_size),
            epoch_days: duration.num_days(),
            next_validation: validation_time
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Result of closing an epoch.
#[derive(Debug)]
pub struct EpochRollover {
    /// Every flip key admitted during the closed epoch.
    pub keys: Vec<Arc<FlipKey>>,
    pub schedule: EpochSchedule,
}

/// Close the current epoch of `pool` and open the one at `next_head`.
pub fn rollover(
    pool: &KeysPool,
    next_head: EpochHead,
    validation_time: DateTime<Utc>,
    network_size: usize,
) -> EpochRollover {
    let keys = pool.rollover(next_head);
    let schedule = EpochSchedule::compute(validation_time, network_size);
    tracing::info!(
        epoch = next_head.epoch,
        network_size,
        epoch_days = schedule.epoch_days,
        long_session_flips = schedule.long_session_flips,
        "Scheduled next validation at {}",
        schedule.next_validation
    );
    EpochRollover { keys, schedule }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SigningKeypair;
    use crate::node::events::ChannelEventSink;
    use crate::node::validation::{IdentityState, IdentityStateValidator};
    use chrono::{Duration, TimeZone};

    #[test]
    fn schedule_for_small_network() {
        // Monday
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let schedule = EpochSchedule::compute(at, 1000);
        assert_eq!(schedule.epoch_days, 10);
        assert_eq!(schedule.next_validation, at + Duration::days(10));
        assert_eq!(schedule.flips_per_identity, 3);
        assert_eq!(schedule.long_session_flips, 30);
        assert_eq!(schedule.short_session_flips, 6);
        assert_eq!(schedule.short_session_extra_flips, 2);
        assert_eq!(schedule.invite_quota, 333);
    }

    #[test]
    fn schedule_saturates_at_latest_time() {
        let at = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let schedule = EpochSchedule::compute(at, 1000);
        assert_eq!(schedule.epoch_days, 10);
        assert_eq!(schedule.next_validation, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn rollover_returns_keys_and_schedule() {
        let validator = Arc::new(IdentityStateValidator::with_defaults());
        let (sink, _rx) = ChannelEventSink::new(16);
        let pool = KeysPool::new(validator.clone(), Arc::new(sink));
        pool.initialize(EpochHead {
            height: 10,
            hash: [1u8; 32],
            epoch: 1,
        });

        let kp = SigningKeypair::generate();
        validator.set_state(kp.address(), IdentityState::Verified);
        pool.add(FlipKey::new_signed(vec![3; 16], 1, &kp)).unwrap();

        let next = EpochHead {
            height: 20,
            hash: [2u8; 32],
            epoch: 2,
        };
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let result = rollover(&pool, next, at, validator.network_size());

        assert_eq!(result.keys.len(), 1);
        assert_eq!(result.schedule.network_size, 1);
        assert_eq!(result.schedule.long_session_flips, 5);
        assert_eq!(result.schedule.epoch_days, 1);
        assert!(pool.is_empty());
        assert_eq!(pool.head(), Some(next));
    }
}
