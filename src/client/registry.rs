use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::responder::BoxedResponder;
use crate::SeqId;

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The protected state is a plain id → responder map with no invariants
/// spanning entries. Responders never run while the lock is held, so a
/// poisoned lock can only come from a panic inside `HashMap` itself.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Tracks commands waiting for their reply.
///
/// Maps sequence ids to the responder that will consume the reply. Insert
/// and take-remove share one lock and the lock is held only for the map
/// operation itself, never across I/O or responder invocation.
#[derive(Default)]
pub struct ResponderRegistry {
    // ---
    responders: Mutex<HashMap<SeqId, BoxedResponder>>,
}

impl ResponderRegistry {
    // ---

    /// Create an empty registry
    pub fn new() -> Self {
        // ---
        Self {
            responders: Mutex::new(HashMap::new()),
        }
    }

    /// Register the responder for `seq_id`.
    ///
    /// An existing entry for the same id is replaced and returned; it will
    /// never see a delivery.
    pub fn register(&self, seq_id: SeqId, responder: BoxedResponder) -> Option<BoxedResponder> {
        // ---
        let displaced = lock_ignore_poison(&self.responders).insert(seq_id, responder);

        if displaced.is_some() {
            crate::log_warn!("seq_id {seq_id} re-registered; previous responder displaced");
        }
        displaced
    }

    /// Atomically look up and remove the responder for `seq_id`.
    pub fn take_and_remove(&self, seq_id: SeqId) -> Option<BoxedResponder> {
        // ---
        lock_ignore_poison(&self.responders).remove(&seq_id)
    }

    /// Remove every pending responder without delivering to any of them.
    pub fn drain(&self) -> Vec<(SeqId, BoxedResponder)> {
        // ---
        lock_ignore_poison(&self.responders).drain().collect()
    }

    pub fn contains(&self, seq_id: SeqId) -> bool {
        lock_ignore_poison(&self.responders).contains_key(&seq_id)
    }

    /// Number of pending responders
    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.responders).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
