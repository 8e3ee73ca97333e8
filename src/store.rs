use crate::command::Command;
use crate::error::{Result, StoreError};
use crate::event::Event;
use crate::journal::Journal;
use crate::log::EventLog;
use crate::machine::StateMachine;
use crate::subscribers::{SubscriptionId, Subscribers};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io;

/// Somewhere committed events are written before they take effect.
///
/// [`Journal`] is the provided implementation; the trait lets a store hold
/// one without knowing the serialization bounds at every call site.
pub trait EventSink<C, S> {
    /// Durably record `event`. An error aborts the command being executed.
    fn persist(&mut self, event: &Event<C, S>) -> io::Result<()>;
}

impl<C: Serialize, S: Serialize> EventSink<C, S> for Journal {
    fn persist(&mut self, event: &Event<C, S>) -> io::Result<()> {
        self.append(event).map(|_| ())
    }
}

/// Event-sourced state container.
///
/// Owns the current state and the [`EventLog`]. Every change goes through
/// [`execute`](Self::execute): the command's pure `apply` computes the next
/// state, the event is recorded, and subscribers are notified before
/// `execute` returns. Any historical state can be rebuilt with
/// [`state_at`](Self::state_at), which replays commands from the initial
/// state.
///
/// Optionally a [`StateMachine`] guards commands that name a machine event,
/// and a [`Journal`] persists each event.
///
/// # Examples
///
/// ```
/// use statefold::{Command, CommandError, ReplayableStore};
///
/// struct Add(i64);
///
/// impl Command for Add {
///     type State = i64;
///     fn name(&self) -> &str { "add" }
///     fn apply(&self, state: &i64) -> Result<i64, CommandError> {
///         Ok(state + self.0)
///     }
/// }
///
/// let mut store = ReplayableStore::<Add>::new(0);
/// store.execute(Add(5)).unwrap();
/// store.execute(Add(-2)).unwrap();
///
/// assert_eq!(*store.state(), 3);
/// assert_eq!(store.state_at(0).unwrap(), 5);
/// assert_eq!(store.log().len(), 2);
/// ```
pub struct ReplayableStore<C: Command> {
    initial: C::State,
    current: C::State,
    log: EventLog<C, C::State>,
    subscribers: Subscribers<C::State>,
    guard: Option<StateMachine>,
    sink: Option<Box<dyn EventSink<C, C::State>>>,
}

impl<C> fmt::Debug for ReplayableStore<C>
where
    C: Command + fmt::Debug,
    C::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayableStore")
            .field("current", &self.current)
            .field("events", &self.log.len())
            .field("subscribers", &self.subscribers)
            .field("guard", &self.guard)
            .field("journaled", &self.sink.is_some())
            .finish()
    }
}

impl<C> ReplayableStore<C>
where
    C: Command,
    C::State: Clone,
{
    /// Create a store with an empty log.
    pub fn new(initial: C::State) -> Self {
        ReplayableStore {
            current: initial.clone(),
            initial,
            log: EventLog::new(),
            subscribers: Subscribers::new(),
            guard: None,
            sink: None,
        }
    }

    /// Resume from an existing log.
    ///
    /// The current state is the replay of every logged command from
    /// `initial`; for an empty log that is `initial` itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Command`] if a logged command fails to apply
    /// during replay.
    pub fn with_log(initial: C::State, log: EventLog<C, C::State>) -> Result<Self> {
        let current = replay(&initial, log.iter().map(|event| &event.command))?;
        Ok(ReplayableStore {
            initial,
            current,
            log,
            subscribers: Subscribers::new(),
            guard: None,
            sink: None,
        })
    }

    /// Attach a state machine that guards commands naming an event.
    ///
    /// A command whose [`Command::event`] is `Some(e)` is rejected with
    /// [`StoreError::Transition`] unless `e` is legal from the machine's
    /// current state; when the command commits, the machine takes the
    /// transition. Commands returning `None` bypass the machine.
    ///
    /// If the log already holds events (after [`with_log`](Self::with_log)
    /// or [`open`](Self::open)), the machine is fast-forwarded along their
    /// events first, without running actions or observers, so it resumes
    /// where the history left it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a logged event is not legal from
    /// the state the machine has reached at that point.
    pub fn with_guard(mut self, mut machine: StateMachine) -> Result<Self> {
        let events = self.log.iter().filter_map(|event| event.command.event());
        machine.fast_forward(events).map_err(|e| {
            StoreError::Corrupt(format!("event history does not fit the machine: {e}"))
        })?;
        self.guard = Some(machine);
        Ok(self)
    }

    /// Persist every event committed from now on to `journal`.
    ///
    /// Events already in the log are not written; use
    /// [`open`](Self::open) to resume a store from its journal.
    pub fn with_journal(mut self, journal: Journal) -> Self
    where
        C: Serialize + 'static,
        C::State: Serialize + 'static,
    {
        self.sink = Some(Box::new(journal));
        self
    }

    /// Attach any other [`EventSink`].
    pub fn with_sink(mut self, sink: impl EventSink<C, C::State> + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Reopen a store from the events in `journal` and keep journaling
    /// to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the journal cannot be read,
    /// [`StoreError::Corrupt`] if its sequence numbers have gaps, or
    /// [`StoreError::Command`] if replay fails.
    pub fn open(journal: Journal, initial: C::State) -> Result<Self>
    where
        C: Serialize + DeserializeOwned + 'static,
        C::State: Serialize + DeserializeOwned + 'static,
    {
        let events = journal.read_all()?;
        log::debug!(
            "resuming store from {} journaled event(s) in {}",
            events.len(),
            journal.dir().display()
        );
        let log = EventLog::from_events(events)?;
        Ok(Self::with_log(initial, log)?.with_journal(journal))
    }

    /// Apply `command`, record it, notify subscribers, and return the new
    /// state.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Transition`] if an attached guard rejects the
    ///   command's event.
    /// - [`StoreError::Command`] if `apply` fails; `source` is the
    ///   command's own error.
    /// - [`StoreError::Io`] if the journal write fails.
    ///
    /// On error the current state, the log, the guard and the subscribers
    /// are exactly as they were before the call.
    pub fn execute(&mut self, command: C) -> Result<&C::State> {
        if let (Some(machine), Some(event)) = (self.guard.as_ref(), command.event()) {
            machine.can_transition(event)?;
        }

        let next = command
            .apply(&self.current)
            .map_err(|source| StoreError::Command {
                command: command.name().to_string(),
                source,
            })?;

        let event = Event::new(self.log.len() as u64, command, next);

        if let Some(sink) = self.sink.as_mut() {
            sink.persist(&event)?;
        }

        if let (Some(machine), Some(name)) = (self.guard.as_mut(), event.command.event()) {
            machine.transition(name)?;
        }

        log::debug!("committed #{} '{}'", event.seq, event.command.name());

        self.current = event.state.clone();
        self.log.push(event);
        self.subscribers.notify(&self.current);

        Ok(&self.current)
    }

    /// Undo the effect of the event at `index` by executing its command's
    /// [`compensate`](Command::compensate) as a new command.
    ///
    /// The compensation goes through [`execute`](Self::execute), so the
    /// guard, the journal and the subscribers see it like any other command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexOutOfRange`] for a bad index,
    /// [`StoreError::NotReversible`] if the command has no compensation, or
    /// any error `execute` returns for the compensation.
    pub fn revert(&mut self, index: usize) -> Result<&C::State> {
        let event = self.log.event_at(index)?;
        let compensation = event.command.compensate().ok_or_else(|| {
            StoreError::NotReversible {
                seq: event.seq,
                command: event.command.name().to_string(),
            }
        })?;
        log::debug!("reverting #{} '{}'", event.seq, event.command.name());
        self.execute(compensation)
    }

    /// The current state.
    pub fn state(&self) -> &C::State {
        &self.current
    }

    /// The state the store was created with, before any logged command.
    pub fn initial_state(&self) -> &C::State {
        &self.initial
    }

    /// Rebuild the state as it was right after the event at `index`.
    ///
    /// Always replays commands `0..=index` from the initial state; the
    /// states cached in the log are not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexOutOfRange`] if `index >= log().len()`,
    /// or [`StoreError::Command`] if a command fails during replay.
    pub fn state_at(&self, index: usize) -> Result<C::State> {
        self.log.event_at(index)?;
        let commands = self.log.events()[..=index].iter().map(|e| &e.command);
        replay(&self.initial, commands)
    }

    /// Rebuild the current state from scratch by replaying the whole log.
    pub fn rebuild(&self) -> Result<C::State> {
        replay(&self.initial, self.log.iter().map(|e| &e.command))
    }

    /// Replay the log and check every cached state matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] naming the first sequence number
    /// whose cached state differs from the replayed one.
    pub fn verify(&self) -> Result<()>
    where
        C::State: PartialEq,
    {
        let mut state = self.initial.clone();
        for event in &self.log {
            state = apply_logged(&event.command, &state)?;
            if state != event.state {
                return Err(StoreError::Corrupt(format!(
                    "cached state at sequence {} does not match replay",
                    event.seq
                )));
            }
        }
        Ok(())
    }

    /// Call `callback` with the new state after every committed command.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&C::State) + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Remove a subscription. Returns `false` if `id` is not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// The event history.
    pub fn log(&self) -> &EventLog<C, C::State> {
        &self.log
    }

    /// The attached guard, if any.
    pub fn machine(&self) -> Option<&StateMachine> {
        self.guard.as_ref()
    }

    /// Mutable access to the attached guard, for observers and actions.
    pub fn machine_mut(&mut self) -> Option<&mut StateMachine> {
        self.guard.as_mut()
    }
}

fn apply_logged<C: Command>(command: &C, state: &C::State) -> Result<C::State> {
    command.apply(state).map_err(|source| StoreError::Command {
        command: command.name().to_string(),
        source,
    })
}

/// Fold `commands` over a clone of `initial`.
fn replay<'a, C>(initial: &C::State, commands: impl IntoIterator<Item = &'a C>) -> Result<C::State>
where
    C: Command + 'a,
    C::State: Clone,
{
    let mut state = initial.clone();
    for command in commands {
        state = apply_logged(command, &state)?;
    }
    Ok(state)
}
