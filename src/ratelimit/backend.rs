//! Admission backend trait for abstracting over engine configurations.

use async_trait::async_trait;

use super::decision::BatchDecision;
use super::request::AdmitRequest;
use crate::error::AdmissionError;

/// Trait for admission backends.
///
/// This lets the command service work with any store behind the engine
/// without naming its type.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Admit or deny a validated batch of limiters.
    async fn admit(&self, request: &AdmitRequest) -> Result<BatchDecision, AdmissionError>;
}
