//! Command handling for the admission server.

use std::sync::Arc;

use tracing::{debug, warn};

use super::protocol::{Command, ParseError, Reply};
use crate::ratelimit::AdmissionBackend;

/// Turns command lines into replies against an admission backend.
pub struct CommandService<R: AdmissionBackend> {
    /// The admission backend
    backend: Arc<R>,
}

impl<R: AdmissionBackend> CommandService<R> {
    /// Create a new CommandService with the given backend.
    pub fn new(backend: Arc<R>) -> Self {
        Self { backend }
    }

    /// Handle one command line.
    pub async fn handle(&self, line: &str) -> Reply {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                if !matches!(err, ParseError::Empty) {
                    warn!(error = %err, "Rejected command");
                }
                return Reply::Error(err.to_string());
            }
        };

        match command {
            Command::Ping => Reply::Pong,
            Command::Quit => Reply::Bye,
            Command::Admit(request) => match self.backend.admit(&request).await {
                Ok(decision) => {
                    debug!(
                        limiters = request.limits.len(),
                        allowed = decision.allowed,
                        remaining = decision.remaining,
                        "Admission decision made"
                    );
                    Reply::Decision(decision)
                }
                Err(err) => {
                    warn!(error = %err, "Admission failed");
                    Reply::Error(err.to_string())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::{AdmissionEngine, BatchDecision};
    use crate::store::{MemoryStore, Value};

    fn service() -> (Arc<MemoryStore>, CommandService<AdmissionEngine<MemoryStore>>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let engine = Arc::new(AdmissionEngine::with_clock(store.clone(), clock));
        (store, CommandService::new(engine))
    }

    #[tokio::test]
    async fn test_admit_returns_decision() {
        let (_, service) = service();
        let reply = service.handle("ADMIT user 10 100 0").await;
        assert_eq!(
            reply,
            Reply::Decision(BatchDecision {
                allowed: true,
                remaining: 9,
                ready_after: 0,
                reset_after: 10,
            })
        );
    }

    #[tokio::test]
    async fn test_admit_uses_engine_clock_without_timestamp() {
        let (store, service) = service();
        service.handle("ADMIT user 10 100").await;
        assert_eq!(store.value("user"), Some(Value::String("10".to_string())));
    }

    #[tokio::test]
    async fn test_validation_error_is_reported() {
        let (store, service) = service();
        let reply = service.handle("ADMIT user 10 100 ip 20 10").await;
        assert_eq!(
            reply,
            Reply::Error("invalid arguments: capacity is smaller than cost for limiter ip".to_string())
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_key_type_error_is_reported() {
        let (store, service) = service();
        store.insert("user", Value::List(vec!["x".to_string()]));
        let reply = service.handle("ADMIT user 1 10 0").await;
        assert!(matches!(reply, Reply::Error(ref msg) if msg.starts_with("wrong type for key user")));
    }

    #[tokio::test]
    async fn test_ping_quit_unknown() {
        let (_, service) = service();
        assert_eq!(service.handle("ping").await, Reply::Pong);
        assert_eq!(service.handle("QUIT").await, Reply::Bye);
        assert_eq!(
            service.handle("FLUSHALL").await,
            Reply::Error("unknown command 'FLUSHALL'".to_string())
        );
    }

    #[test]
    fn test_handle_blocking() {
        let (_, service) = service();
        // eight arguments are neither triples nor triples plus a timestamp
        let reply = tokio_test::block_on(service.handle("ADMIT k 1 1 k2 1 1 0 9"));
        assert!(matches!(reply, Reply::Error(ref msg) if msg.starts_with("wrong number of arguments")));
    }
}
