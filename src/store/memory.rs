//! In-process store with per-key expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::{Store, StoreContext, StoreError, StoredValue};
use crate::clock::{Clock, SystemClock};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A value held by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Plain string, the only kind limiter state is stored as.
    String(String),
    /// List of strings. Exists so keys shared with other tooling can hold
    /// something that is not bucket state.
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Absolute expiry in clock nanoseconds.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// An in-memory [`Store`].
///
/// Every execution holds a single lock for its whole duration, so batches are
/// fully serialized. Writes are buffered and applied only when the closure
/// returns `Ok`; a failed execution leaves every key untouched.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store that expires keys by the host wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that expires keys by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Store `value` under `key` with no expiry.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    /// Get the live value for `key`.
    pub fn value(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_nanos();
        self.entries
            .lock()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Get the absolute expiry of `key`, in clock nanoseconds.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        self.entries.lock().get(key).and_then(|e| e.expires_at)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_nanos();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed = removed, remaining = entries.len(), "Purged expired keys");
        }
        removed
    }

    /// Purge expired keys every `period` on the current tokio runtime.
    ///
    /// Reads already treat expired keys as absent; sweeping only reclaims
    /// memory. The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        })
    }

    /// Number of keys held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Store for MemoryStore {
    fn execute<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreContext) -> Result<T, E>,
        E: From<StoreError>,
    {
        let now = self.clock.now_nanos();
        let mut entries = self.entries.lock();

        let (result, writes) = {
            let mut tx = Transaction {
                entries: &*entries,
                now,
                writes: HashMap::new(),
            };
            let result = f(&mut tx);
            (result, tx.writes)
        };

        match result {
            Ok(value) => {
                trace!(writes = writes.len(), "Applying buffered writes");
                for (key, write) in writes {
                    apply(&mut entries, key, write, now);
                }
                Ok(value)
            }
            Err(err) => {
                debug!(discarded = writes.len(), "Execution failed, discarding writes");
                Err(err)
            }
        }
    }
}

#[derive(Debug, Default)]
struct PendingWrite {
    value: Option<String>,
    expire_secs: Option<u64>,
}

fn apply(entries: &mut HashMap<String, Entry>, key: String, write: PendingWrite, now: i64) {
    let expires_at = write.expire_secs.map(|secs| {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        now.saturating_add(secs.saturating_mul(NANOS_PER_SEC))
    });

    match write.value {
        Some(value) => {
            entries.insert(
                key,
                Entry {
                    value: Value::String(value),
                    expires_at,
                },
            );
        }
        None => {
            if let Some(entry) = entries.get_mut(&key) {
                entry.expires_at = expires_at.or(entry.expires_at);
            }
        }
    }
}

/// One execution's view of the store: committed entries plus its own writes.
struct Transaction<'a> {
    entries: &'a HashMap<String, Entry>,
    now: i64,
    writes: HashMap<String, PendingWrite>,
}

impl Transaction<'_> {
    fn exists(&self, key: &str) -> bool {
        let pending = self.writes.get(key).is_some_and(|w| w.value.is_some());
        pending || self.entries.get(key).is_some_and(|e| !e.is_expired(self.now))
    }
}

impl StoreContext for Transaction<'_> {
    fn get(&self, key: &str) -> Result<StoredValue, StoreError> {
        if let Some(value) = self.writes.get(key).and_then(|w| w.value.as_ref()) {
            return Ok(StoredValue::Scalar(value.clone()));
        }

        let stored = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(self.now) => match &entry.value {
                Value::String(s) => StoredValue::Scalar(s.clone()),
                Value::List(_) => StoredValue::TypeMismatch,
            },
            _ => StoredValue::Absent,
        };
        Ok(stored)
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.writes.insert(
            key.to_string(),
            PendingWrite {
                value: Some(value),
                expire_secs: None,
            },
        );
        Ok(())
    }

    fn set_expire(&mut self, key: &str, seconds: u64) -> Result<(), StoreError> {
        if !self.exists(key) {
            return Err(StoreError::NoSuchKey(key.to_string()));
        }
        self.writes.entry(key.to_string()).or_default().expire_secs = Some(seconds);
        Ok(())
    }
}
