use crate::error::CommandError;
use std::fmt;

/// A named, immutable request to change state.
///
/// `apply` must be pure: it reads the given state and the command's own
/// payload and returns a new state, deterministically, without mutating
/// anything. The store relies on this to rebuild historical states by
/// replaying commands from the initial state.
///
/// Commands are usually modelled as one enum per domain.
///
/// # Examples
///
/// ```
/// use statefold::{Command, CommandError};
///
/// enum Counter {
///     Add(u64),
///     Sub(u64),
/// }
///
/// impl Command for Counter {
///     type State = u64;
///
///     fn name(&self) -> &str {
///         match self {
///             Counter::Add(_) => "add",
///             Counter::Sub(_) => "sub",
///         }
///     }
///
///     fn apply(&self, state: &u64) -> Result<u64, CommandError> {
///         match self {
///             Counter::Add(n) => Ok(state + n),
///             Counter::Sub(n) => state
///                 .checked_sub(*n)
///                 .ok_or_else(|| CommandError::new("counter would go negative")),
///         }
///     }
/// }
///
/// assert_eq!(Counter::Add(2).apply(&1).unwrap(), 3);
/// assert!(Counter::Sub(5).apply(&1).is_err());
/// ```
pub trait Command {
    /// The state this command operates on.
    type State;

    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Compute the next state from `state`.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when the command cannot be applied to
    /// `state`. The store then leaves everything untouched.
    fn apply(&self, state: &Self::State) -> Result<Self::State, CommandError>;

    /// The state-machine event this command requires, if any.
    ///
    /// When a store has a guard attached, commands returning `Some(event)`
    /// are only applied if `event` is legal from the machine's current
    /// state, and the machine takes that transition when the command
    /// commits.
    fn event(&self) -> Option<&str> {
        None
    }

    /// The command that undoes this one's effect, if there is one.
    ///
    /// [`ReplayableStore::revert`](crate::ReplayableStore::revert) appends
    /// it as a new command; the log itself is never rewritten.
    fn compensate(&self) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// A pure function applying a payload to a state.
pub type ApplyFn<S, P> = fn(&S, &P) -> Result<S, CommandError>;

/// A [`Command`] built from a name, a payload and an [`ApplyFn`].
///
/// Lets callers use the `(state, payload) -> state` shape without defining
/// a command type.
///
/// # Examples
///
/// ```
/// use statefold::{CommandError, FnCommand, ReplayableStore};
///
/// fn push(state: &Vec<String>, item: &String) -> Result<Vec<String>, CommandError> {
///     let mut next = state.clone();
///     next.push(item.clone());
///     Ok(next)
/// }
///
/// let mut store = ReplayableStore::<FnCommand<Vec<String>, String>>::new(Vec::new());
/// store.execute(FnCommand::new("push", "a".to_string(), push)).unwrap();
/// store.execute(FnCommand::new("push", "b".to_string(), push)).unwrap();
/// assert_eq!(store.state(), &vec!["a".to_string(), "b".to_string()]);
/// ```
pub struct FnCommand<S, P> {
    name: String,
    payload: P,
    apply: ApplyFn<S, P>,
    event: Option<String>,
}

impl<S, P> FnCommand<S, P> {
    pub fn new(name: &str, payload: P, apply: ApplyFn<S, P>) -> Self {
        FnCommand {
            name: name.to_string(),
            payload,
            apply,
            event: None,
        }
    }

    /// Require a state-machine event for this command.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<S, P> Command for FnCommand<S, P> {
    type State = S;

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, state: &S) -> Result<S, CommandError> {
        (self.apply)(state, &self.payload)
    }

    fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

impl<S, P: Clone> Clone for FnCommand<S, P> {
    fn clone(&self) -> Self {
        FnCommand {
            name: self.name.clone(),
            payload: self.payload.clone(),
            apply: self.apply,
            event: self.event.clone(),
        }
    }
}

impl<S, P: fmt::Debug> fmt::Debug for FnCommand<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("event", &self.event)
            .finish()
    }
}
