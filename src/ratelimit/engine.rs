//! Two-phase admission across a batch of limiters.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::AdmissionBackend;
use super::bucket::{self, BucketState};
use super::decision::{BatchDecision, LimitOutcome};
use super::request::AdmitRequest;
use crate::clock::{Clock, SystemClock};
use crate::error::AdmissionError;
use crate::store::Store;

/// A batch decision together with the outcome of every limiter, in request
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The aggregated decision
    pub decision: BatchDecision,
    /// Per-limiter outcomes
    pub outcomes: Vec<LimitOutcome>,
}

/// Admits batches of limiters against a [`Store`].
///
/// A batch is admitted only if every limiter in it has at least its cost
/// available; otherwise nothing is debited. Both the evaluation and the
/// resulting writes run inside a single [`Store::execute`] call, so the store's
/// isolation guarantee covers the whole batch.
///
/// Capacity belongs to the key, not to the batch entry. A key named more than
/// once in one batch has every occurrence checked against the state before
/// the call, and the last occurrence's write is the one kept.
pub struct AdmissionEngine<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> AdmissionEngine<S> {
    /// Create an engine that stamps requests by the host wall clock.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create an engine that stamps requests by `clock`.
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Admit or deny a batch.
    pub fn admit(&self, request: &AdmitRequest) -> Result<BatchDecision, AdmissionError> {
        self.admit_detailed(request).map(|admission| admission.decision)
    }

    /// Admit or deny a batch, also returning each limiter's outcome.
    pub fn admit_detailed(&self, request: &AdmitRequest) -> Result<Admission, AdmissionError> {
        // Nothing touches the store until every limiter is known to be valid
        request.validate()?;

        let now = request.now.unwrap_or_else(|| self.clock.now_nanos());
        let limits = &request.limits;

        let (allowed, outcomes) = self.store.execute(|ctx| -> Result<_, AdmissionError> {
            // Phase 1: read every limiter and decide for the whole batch
            let mut available = Vec::with_capacity(limits.len());
            for limit in limits {
                let stored = ctx.get(&limit.key)?;
                let state = BucketState::decode(&limit.key, &stored)?;
                let avail = bucket::available(now, limit.capacity, state.map(|s| s.reset_at));

                trace!(
                    key = %limit.key,
                    cost = limit.cost,
                    capacity = limit.capacity,
                    available = avail,
                    "Evaluated limiter"
                );
                available.push(avail);
            }

            let allowed = limits
                .iter()
                .zip(&available)
                .all(|(limit, avail)| *avail >= limit.cost);

            // Phase 2: rewrite every limiter, debited only if admitted. A
            // denied limiter is rewritten with the value it already derives.
            let outcomes = limits
                .iter()
                .zip(available)
                .map(|(limit, avail)| -> Result<LimitOutcome, AdmissionError> {
                    let outcome = LimitOutcome::new(limit.cost, limit.capacity, avail, allowed);
                    let state = BucketState {
                        reset_at: now.saturating_add(outcome.reset_after),
                    };
                    ctx.set(&limit.key, state.encode())?;
                    ctx.set_expire(&limit.key, bucket::expiry_secs(outcome.reset_after))?;
                    Ok(outcome)
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok((allowed, outcomes))
        })?;

        let decision = BatchDecision::aggregate(allowed, &outcomes);

        if !allowed {
            debug!(
                limiters = limits.len(),
                ready_after = decision.ready_after,
                "Admission denied"
            );
        }

        Ok(Admission { decision, outcomes })
    }
}

impl<S: Store> std::fmt::Debug for AdmissionEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: Store + 'static> AdmissionBackend for AdmissionEngine<S> {
    async fn admit(&self, request: &AdmitRequest) -> Result<BatchDecision, AdmissionError> {
        AdmissionEngine::admit(self, request)
    }
}
