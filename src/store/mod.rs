//! Key-value storage backing limiter state.
//!
//! The admission engine never touches storage directly. It runs one closure per
//! batch inside [`Store::execute`], and the store guarantees that no other batch
//! mutates any key between the closure's first read and its last write.

mod memory;

pub use memory::{MemoryStore, Value};

use thiserror::Error;

/// Errors raised at the storage boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An expiry was requested for a key that holds no value.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// What a key currently holds, as seen by the admission engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// No value, or the value has expired.
    Absent,
    /// A string value. It still has to be decoded.
    Scalar(String),
    /// A value of some other kind that cannot hold bucket state.
    TypeMismatch,
}

/// Per-key operations available inside one isolated execution.
pub trait StoreContext {
    /// Read the current value of `key`, including writes made earlier in
    /// this execution.
    fn get(&self, key: &str) -> Result<StoredValue, StoreError>;

    /// Replace the value of `key`, clearing any expiry.
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;

    /// Expire `key` after `seconds` whole seconds.
    fn set_expire(&mut self, key: &str, seconds: u64) -> Result<(), StoreError>;
}

/// A store that can run a closure with exclusive access to every key it touches.
pub trait Store: Send + Sync {
    /// Run `f` in an execution context isolated from every other call to
    /// `execute`.
    ///
    /// Implementations decide what happens to writes when `f` fails; they must
    /// document it.
    fn execute<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreContext) -> Result<T, E>,
        E: From<StoreError>;
}
