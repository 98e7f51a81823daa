//! Per-limiter outcomes and the batch decision built from them.

/// What happened to one limiter during an admission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOutcome {
    /// Capacity available before the call
    pub available_before: i64,
    /// Capacity available after the call
    pub available_after: i64,
    /// Further requests of the same cost this limiter could admit right now.
    /// `i64::MAX` when the cost is zero.
    pub remaining_units: i64,
    /// Nanoseconds until this limiter alone could admit the cost again
    pub ready_after: i64,
    /// Nanoseconds until this limiter is full
    pub reset_after: i64,
}

impl LimitOutcome {
    /// Derive the outcome of a limiter of `capacity` charged `cost`, given
    /// what was available and whether the batch was admitted.
    ///
    /// An admitted limiter must have had at least `cost` available.
    pub(crate) fn new(cost: i64, capacity: i64, available_before: i64, allowed: bool) -> Self {
        debug_assert!(
            !allowed || available_before >= cost,
            "admitted limiter had {} available for cost {}",
            available_before,
            cost
        );

        let available_after = if allowed {
            available_before - cost
        } else {
            available_before
        };

        let remaining_units = if cost == 0 {
            i64::MAX
        } else {
            available_after / cost
        };

        Self {
            available_before,
            available_after,
            remaining_units,
            ready_after: (cost - available_after).max(0),
            reset_after: capacity - available_after,
        }
    }
}

/// The externally visible result of an admission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDecision {
    /// Whether every limiter admitted the request
    pub allowed: bool,
    /// Further requests of the same costs admissible now, bounded by the most
    /// constrained limiter
    pub remaining: i64,
    /// Nanoseconds until the most exhausted limiter could admit its cost
    pub ready_after: i64,
    /// Nanoseconds until the slowest limiter is full
    pub reset_after: i64,
}

impl BatchDecision {
    /// Fold limiter outcomes into one decision. The worst limiter wins every
    /// metric.
    pub fn aggregate<'a, I>(allowed: bool, outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a LimitOutcome>,
    {
        let initial = Self {
            allowed,
            remaining: i64::MAX,
            ready_after: 0,
            reset_after: 0,
        };

        outcomes.into_iter().fold(initial, |acc, outcome| Self {
            allowed: acc.allowed,
            remaining: acc.remaining.min(outcome.remaining_units),
            ready_after: acc.ready_after.max(outcome.ready_after),
            reset_after: acc.reset_after.max(outcome.reset_after),
        })
    }
}
