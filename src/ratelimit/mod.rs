//! Admission control over time-domain token buckets.

mod backend;
mod bucket;
mod decision;
mod engine;
mod request;

pub use backend::AdmissionBackend;
pub use bucket::{available, expiry_secs, BucketState};
pub use decision::{BatchDecision, LimitOutcome};
pub use engine::{Admission, AdmissionEngine};
pub use request::{AdmitRequest, LimitSpec};
