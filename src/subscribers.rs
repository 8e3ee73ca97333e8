//! Ordered callback registry shared by the store and the state machine.

use serde::Serialize;
use std::fmt;

/// Handle identifying one registration.
///
/// Returned by [`ReplayableStore::subscribe`](crate::ReplayableStore::subscribe)
/// and [`StateMachine::on_transition`](crate::StateMachine::on_transition);
/// pass it back to `unsubscribe` to remove exactly that callback.
///
/// Ids are only handed out by a registry; they cannot be made up:
///
/// ```compile_fail
/// let forged = statefold::SubscriptionId(1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback<T> = Box<dyn FnMut(&T)>;

/// Callbacks notified in registration order.
pub struct Subscribers<T> {
    entries: Vec<(SubscriptionId, Callback<T>)>,
    next_id: u64,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Subscribers {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a callback. Every call gets a fresh id, even for the same
    /// closure logic.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Remove the callback registered under `id`.
    ///
    /// Returns `false` if `id` was never registered or already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Call every registered callback with `value`, oldest first.
    pub fn notify(&mut self, value: &T) {
        log::trace!("notifying {} subscriber(s)", self.entries.len());
        for (_, callback) in self.entries.iter_mut() {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<_> = self.entries.iter().map(|(id, _)| id).collect();
        f.debug_struct("Subscribers").field("ids", &ids).finish()
    }
}
