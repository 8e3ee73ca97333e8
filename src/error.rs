use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Errors raised by a [`StateMachine`](crate::StateMachine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// The event has no mapped target from the current state.
    #[error("invalid transition: event '{event}' is not allowed from state '{state}'")]
    InvalidTransition { state: String, event: String },

    /// The definition names an initial state that it does not declare.
    #[error("initial state '{0}' is not declared in the machine definition")]
    UnknownInitialState(String),
}

/// An index outside `[0, len)` was requested from a log or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} out of range for log of length {len}")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Failure returned by [`Command::apply`](crate::Command::apply).
///
/// Wraps whatever error the command produced so the caller gets the
/// original payload back through [`std::error::Error::source`] or
/// [`CommandError::downcast_ref`].
#[derive(Debug, Error)]
#[error("{inner}")]
pub struct CommandError {
    #[source]
    inner: Box<dyn StdError + Send + Sync>,
}

impl CommandError {
    /// Wrap an error or message.
    ///
    /// # Examples
    ///
    /// ```
    /// use statefold::CommandError;
    ///
    /// let err = CommandError::new("user 'u9' does not exist");
    /// assert_eq!(err.to_string(), "user 'u9' does not exist");
    /// ```
    pub fn new(inner: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CommandError {
            inner: inner.into(),
        }
    }

    /// Borrow the wrapped error as a concrete type, if it is one.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Unwrap into the boxed error the command returned.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }
}

/// Errors raised by a [`ReplayableStore`](crate::ReplayableStore) or an
/// [`EventLog`](crate::EventLog).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transition(#[from] MachineError),

    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),

    #[error("command '{command}' failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    #[error("command '{command}' at sequence {seq} has no compensation")]
    NotReversible { seq: u64, command: String },

    #[error("corrupt event history: {0}")]
    Corrupt(String),

    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
