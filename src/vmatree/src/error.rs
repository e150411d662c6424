//! Error types for the interval index.
use std::fmt;
use thiserror::Error;

/// Result type alias using VmaTreeError.
pub type Result<T> = std::result::Result<T, VmaTreeError>;

/// Errors reported by lookups that may legitimately miss and by the
/// consistency checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmaTreeError {
    #[error("key not found in the index")]
    NotFound,

    #[error("stale node handle: {0}")]
    StaleHandle(usize),

    #[error("invariant violated at key {key}: {reason}")]
    InvariantViolated { key: String, reason: String },
}

/// Returned by `insert` when the key is already indexed.
///
/// The rejected pair is handed back so the caller keeps ownership of it.
#[derive(Error)]
#[error("key {key:?} is already indexed")]
pub struct DuplicateKey<K: fmt::Debug, V> {
    pub key: K,
    pub value: V,
}

impl<K: fmt::Debug, V> DuplicateKey<K, V> {
    pub fn into_inner(self) -> (K, V) {
        (self.key, self.value)
    }
}

// The value is usually a whole region object; keep it out of the output.
impl<K: fmt::Debug, V> fmt::Debug for DuplicateKey<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateKey")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
