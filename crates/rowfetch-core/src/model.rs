#![forbid(unsafe_code)]

//! The slow-lookup collaborator behind row loading.
//!
//! The coordinator treats the data source as an opaque, possibly-slow
//! function from a [`RowKey`] to display text. Latency is unspecified and
//! fetches carry no ordering guarantee of their own; everything that makes
//! out-of-order completion safe lives in the queue and coordinator, not
//! here.
//!
//! # Failure policy
//!
//! `fetch` may fail. A failed fetch never crashes a slot or touches its
//! displayed text: the coordinator suppresses the commit, keeps whatever
//! the slot last showed, and logs at `warn`.

use std::fmt;

/// Identity of the logical item a slot currently represents.
///
/// Opaque and comparable; the demo uses the row index. Immutable once a
/// task has been created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(u64);

impl RowKey {
    /// Create a key from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw key value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for RowKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error from a failed row fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    key: RowKey,
    message: String,
}

impl FetchError {
    /// Create an error for `key` with a human-readable message.
    #[must_use]
    pub fn new(key: RowKey, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }

    /// The key whose fetch failed.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch for key {} failed: {}", self.key, self.message)
    }
}

impl std::error::Error for FetchError {}

/// A data source that resolves a [`RowKey`] to display text.
///
/// `fetch` runs on a background worker and may block for as long as it
/// likes; it must never be called on the UI-owning thread. Implementations
/// should be stateless with respect to slots — the same key may be fetched
/// concurrently for different slots.
pub trait RowModel: Send + Sync {
    /// Resolve `key` to its display text.
    fn fetch(&self, key: RowKey) -> Result<String, FetchError>;
}

impl<F> RowModel for F
where
    F: Fn(RowKey) -> Result<String, FetchError> + Send + Sync,
{
    fn fetch(&self, key: RowKey) -> Result<String, FetchError> {
        self(key)
    }
}
