//! Time-domain token bucket.
//!
//! A bucket refills at one capacity unit per nanosecond. Instead of a token
//! count plus a last-refill time, its whole state is `reset_at`: the instant at
//! which it would be full again if nothing else were consumed. Availability is
//! derived from that instant and the current time on every read, so there is
//! no refill bookkeeping to drift and repeated reads are idempotent.

use crate::error::AdmissionError;
use crate::store::StoredValue;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Persisted state of one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Nanosecond instant at which the bucket is full.
    pub reset_at: i64,
}

impl BucketState {
    /// Decode the state stored under `key`.
    ///
    /// Returns `None` for an absent key, which callers treat as a full bucket.
    pub fn decode(key: &str, stored: &StoredValue) -> Result<Option<Self>, AdmissionError> {
        match stored {
            StoredValue::Absent => Ok(None),
            StoredValue::Scalar(raw) => raw
                .trim()
                .parse::<i64>()
                .map(|reset_at| Some(Self { reset_at }))
                .map_err(|_| AdmissionError::KeyType {
                    key: key.to_string(),
                    reason: "value is not an integer",
                }),
            StoredValue::TypeMismatch => Err(AdmissionError::KeyType {
                key: key.to_string(),
                reason: "value is not a string",
            }),
        }
    }

    /// Encode for storage as decimal ASCII.
    pub fn encode(&self) -> String {
        self.reset_at.to_string()
    }

    /// Capacity available at `now` for a bucket of `capacity`.
    pub fn available(&self, now: i64, capacity: i64) -> i64 {
        available(now, capacity, Some(self.reset_at))
    }
}

/// Capacity available at `now` for a bucket of `capacity` that is full at
/// `reset_at`, clamped to `[0, capacity]`.
///
/// A missing `reset_at` is a fresh bucket and yields `capacity`.
pub fn available(now: i64, capacity: i64, reset_at: Option<i64>) -> i64 {
    let Some(reset_at) = reset_at else {
        return capacity;
    };
    let capacity = capacity.max(0);
    now.saturating_add(capacity)
        .saturating_sub(reset_at)
        .clamp(0, capacity)
}

/// Seconds a key must be retained for a bucket that fills in `reset_after`
/// nanoseconds. One extra second covers the truncated remainder.
pub fn expiry_secs(reset_after: i64) -> u64 {
    u64::try_from(reset_after.max(0) / NANOS_PER_SEC).unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_fresh_bucket_is_full() {
        assert_eq!(available(0, 100, None), 100);
        assert_eq!(available(i64::MAX, 0, None), 0);
    }

    #[test]
    fn test_available_refills_one_unit_per_nanosecond() {
        // Emptied at t=0, full again at t=100
        let state = BucketState { reset_at: 100 };
        assert_eq!(state.available(0, 100), 0);
        assert_eq!(state.available(30, 100), 30);
        assert_eq!(state.available(100, 100), 100);
        assert_eq!(state.available(10_000, 100), 100);
    }

    #[test]
    fn test_available_clamps_future_reset() {
        // reset_at further out than one capacity from now
        let state = BucketState { reset_at: 1_000 };
        assert_eq!(state.available(0, 100), 0);
    }

    #[test]
    fn test_available_survives_extreme_values() {
        assert_eq!(available(i64::MAX, 100, Some(i64::MIN)), 100);
        assert_eq!(available(i64::MIN, 100, Some(i64::MAX)), 0);
    }

    #[test]
    fn test_available_always_within_capacity() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let now: i64 = rng.gen();
            let capacity: i64 = rng.gen_range(0..=i64::MAX);
            let reset_at: i64 = rng.gen();
            let value = available(now, capacity, Some(reset_at));
            assert!(
                (0..=capacity).contains(&value),
                "available {} outside [0, {}] for now={} reset_at={}",
                value,
                capacity,
                now,
                reset_at
            );
        }
    }

    #[test]
    fn test_decode_scalar() {
        let stored = StoredValue::Scalar("1700000000000000000".to_string());
        let state = BucketState::decode("k", &stored).unwrap();
        assert_eq!(state, Some(BucketState { reset_at: 1_700_000_000_000_000_000 }));
    }

    #[test]
    fn test_decode_absent() {
        assert_eq!(BucketState::decode("k", &StoredValue::Absent).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_non_integer() {
        let stored = StoredValue::Scalar("soon".to_string());
        let err = BucketState::decode("login/user/jsmith", &stored).unwrap_err();
        assert!(matches!(err, AdmissionError::KeyType { ref key, .. } if key == "login/user/jsmith"));
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let err = BucketState::decode("k", &StoredValue::TypeMismatch).unwrap_err();
        assert!(matches!(err, AdmissionError::KeyType { .. }));
    }

    #[test]
    fn test_encode_is_decimal() {
        assert_eq!(BucketState { reset_at: -42 }.encode(), "-42");
        assert_eq!(BucketState { reset_at: 10 }.encode(), "10");
    }

    #[test]
    fn test_expiry_secs() {
        assert_eq!(expiry_secs(0), 1);
        assert_eq!(expiry_secs(999_999_999), 1);
        assert_eq!(expiry_secs(1_000_000_000), 2);
        assert_eq!(expiry_secs(2_500_000_000), 3);
    }
}
