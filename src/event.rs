use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A committed command together with the state it produced.
///
/// Events are created by [`EventLog::append`](crate::EventLog::append) and
/// never modified afterwards. When persisted by a
/// [`Journal`](crate::Journal), each event is one JSON line:
///
/// ```text
/// {"seq":0,"command":{"AddUser":{"id":"u1","name":"John"}},"state":{...},"ts":1700000000}
/// ```
///
/// # Examples
///
/// ```
/// use statefold::Event;
///
/// let event = Event::new(0, "increment", 1u64);
/// assert_eq!(event.seq, 0);
/// assert_eq!(event.command, "increment");
/// assert_eq!(event.state, 1);
/// assert!(event.ts > 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct Event<C, S> {
    /// Position in the log, starting at 0 with no gaps.
    pub seq: u64,

    /// The command that was applied.
    pub command: C,

    /// State after applying `command`. Kept so persisted logs are
    /// self-describing; replay never reads it.
    pub state: S,

    /// Unix timestamp in seconds, taken when the event was created.
    pub ts: u64,
}

impl<C, S> Event<C, S> {
    /// Create an event stamped with the current time.
    pub fn new(seq: u64, command: C, state: S) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Event {
            seq,
            command,
            state,
            ts,
        }
    }

    /// Override the timestamp.
    ///
    /// Useful for tests and for importing events recorded elsewhere.
    ///
    /// # Examples
    ///
    /// ```
    /// use statefold::Event;
    ///
    /// let event = Event::new(3, "noop", ()).with_ts(1000);
    /// assert_eq!(event.ts, 1000);
    /// ```
    pub fn with_ts(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }
}
