use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sequence identifier used to match a command with its reply.
///
/// Sequence ids are carried *in-band* inside the wire envelope and are only
/// meaningful within a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(u64);

impl SeqId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SeqId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection-scoped source of sequence ids.
///
/// Ids start at 1 and increase by one per call. The counter is 64-bit, so
/// wraparound is not handled.
#[derive(Debug)]
pub struct SeqAllocator {
    next: AtomicU64,
}

impl SeqAllocator {
    // ---
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first`.
    pub(crate) fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id. Safe to call from any thread.
    pub fn next(&self) -> SeqId {
        // ---
        SeqId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SeqAllocator {
    fn default() -> Self {
        Self::new()
    }
}
