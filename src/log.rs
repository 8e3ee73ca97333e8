use crate::error::{IndexOutOfRange, StoreError};
use crate::event::Event;
use std::slice;

/// In-memory, append-only history of committed events.
///
/// Sequence numbers are exactly `0..len()`: the log never reorders,
/// edits or removes an entry.
///
/// # Examples
///
/// ```
/// use statefold::EventLog;
///
/// let mut log = EventLog::new();
/// log.append("first", 1u32);
/// log.append("second", 2u32);
///
/// assert_eq!(log.len(), 2);
/// assert_eq!(log.event_at(1).unwrap().command, "second");
/// assert!(log.event_at(2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog<C, S> {
    events: Vec<Event<C, S>>,
}

impl<C, S> Default for EventLog<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S> EventLog<C, S> {
    /// Create an empty log.
    pub fn new() -> Self {
        EventLog { events: Vec::new() }
    }

    /// Adopt a previously recorded history, e.g. one read back from a
    /// [`Journal`](crate::Journal).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] unless the sequence numbers are
    /// exactly `0, 1, .., n-1` in order.
    pub fn from_events(events: Vec<Event<C, S>>) -> Result<Self, StoreError> {
        for (expected, event) in events.iter().enumerate() {
            if event.seq != expected as u64 {
                return Err(StoreError::Corrupt(format!(
                    "expected sequence number {expected}, found {}",
                    event.seq
                )));
            }
        }
        Ok(EventLog { events })
    }

    /// Record a committed command and the state it produced.
    ///
    /// The event gets the next sequence number (the log length before the
    /// append) and the current time.
    pub fn append(&mut self, command: C, state: S) -> &Event<C, S> {
        let event = Event::new(self.events.len() as u64, command, state);
        self.push(event)
    }

    /// Append an already built event. Its sequence number must be the next
    /// one; callers inside the crate guarantee it.
    pub(crate) fn push(&mut self, event: Event<C, S>) -> &Event<C, S> {
        debug_assert_eq!(event.seq, self.events.len() as u64);
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// All events in sequence order.
    pub fn events(&self) -> &[Event<C, S>] {
        &self.events
    }

    /// The event at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexOutOfRange`] if `index >= len()`.
    pub fn event_at(&self, index: usize) -> Result<&Event<C, S>, IndexOutOfRange> {
        self.events.get(index).ok_or(IndexOutOfRange {
            index,
            len: self.events.len(),
        })
    }

    /// The most recent event, if any.
    pub fn last(&self) -> Option<&Event<C, S>> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Event<C, S>> {
        self.events.iter()
    }
}

impl<'a, C, S> IntoIterator for &'a EventLog<C, S> {
    type Item = &'a Event<C, S>;
    type IntoIter = slice::Iter<'a, Event<C, S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
