use crate::error::MachineError;
use crate::subscribers::{SubscriptionId, Subscribers};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outgoing edges of one named state, keyed by event name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDef {
    #[serde(default)]
    pub transitions: BTreeMap<String, String>,
}

/// States, their legal transitions, and the initial state.
///
/// The JSON form mirrors the definition object a caller would write by
/// hand; states without a `transitions` key are terminal:
///
/// ```
/// use statefold::MachineDefinition;
///
/// let definition = MachineDefinition::from_json(r#"{
///     "initialState": "draft",
///     "states": {
///         "draft":   { "transitions": { "submit": "pending" } },
///         "pending": { "transitions": { "approve": "approved" } },
///         "approved": {}
///     }
/// }"#).unwrap();
///
/// assert_eq!(definition.initial(), "draft");
/// assert_eq!(definition.target("draft", "submit"), Some("pending"));
/// ```
///
/// The same definition, built in code:
///
/// ```
/// use statefold::MachineDefinition;
///
/// let definition = MachineDefinition::new("draft")
///     .transition("draft", "submit", "pending")
///     .transition("pending", "approve", "approved")
///     .state("approved");
/// assert_eq!(definition.target("pending", "approve"), Some("approved"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDefinition {
    #[serde(rename = "initialState", alias = "initial")]
    initial: String,
    #[serde(default)]
    states: BTreeMap<String, StateDef>,
}

impl MachineDefinition {
    /// Start a definition whose machine begins in `initial`.
    ///
    /// `initial` is declared as a state with no transitions; add edges with
    /// [`transition`](Self::transition).
    pub fn new(initial: &str) -> Self {
        let mut states = BTreeMap::new();
        states.insert(initial.to_string(), StateDef::default());
        MachineDefinition {
            initial: initial.to_string(),
            states,
        }
    }

    /// Declare a state. Declaring an existing state keeps its edges.
    pub fn state(mut self, name: &str) -> Self {
        self.states.entry(name.to_string()).or_default();
        self
    }

    /// Declare the edge `from --event--> to`, declaring `from` if needed.
    /// A second edge for the same `(from, event)` replaces the first.
    pub fn transition(mut self, from: &str, event: &str, to: &str) -> Self {
        self.states
            .entry(from.to_string())
            .or_default()
            .transitions
            .insert(event.to_string(), to.to_string());
        self
    }

    /// Parse a definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the input is not a definition.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Declared state names, sorted.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn contains(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    /// The target of `event` from `state`, if that edge exists.
    pub fn target(&self, state: &str, event: &str) -> Option<&str> {
        self.states
            .get(state)?
            .transitions
            .get(event)
            .map(String::as_str)
    }

    /// Events with an edge out of `state`, sorted.
    pub fn events(&self, state: &str) -> Vec<&str> {
        self.states
            .get(state)
            .map(|def| def.transitions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check the initial state exists and declare every undeclared target
    /// as a terminal state.
    fn validated(mut self) -> Result<Self, MachineError> {
        if !self.states.contains_key(&self.initial) {
            return Err(MachineError::UnknownInitialState(self.initial));
        }
        let targets: Vec<String> = self
            .states
            .values()
            .flat_map(|def| def.transitions.values())
            .filter(|to| !self.states.contains_key(*to))
            .cloned()
            .collect();
        for to in targets {
            self.states.entry(to).or_default();
        }
        Ok(self)
    }
}

/// An accepted state change, as delivered to observers and actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub event: String,
}

type Action = Box<dyn FnMut(&Transition)>;

/// A finite state machine that only moves along declared edges.
///
/// Rejected events change nothing. An accepted event runs, in order: the
/// exit actions of the source state, the state change, the entry actions
/// of the target state, then every observer in subscription order.
///
/// # Examples
///
/// ```
/// use statefold::{MachineDefinition, MachineError, StateMachine};
///
/// let definition = MachineDefinition::new("A").transition("A", "go", "B");
/// let mut machine = StateMachine::new(definition).unwrap();
///
/// assert!(matches!(
///     machine.transition("stop"),
///     Err(MachineError::InvalidTransition { .. })
/// ));
/// assert_eq!(machine.state(), "A");
///
/// assert_eq!(machine.transition("go").unwrap(), "B");
/// assert!(machine.is_terminal());
/// ```
pub struct StateMachine {
    definition: MachineDefinition,
    current: String,
    observers: Subscribers<Transition>,
    enter_actions: BTreeMap<String, Vec<Action>>,
    exit_actions: BTreeMap<String, Vec<Action>>,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("definition", &self.definition)
            .field("observers", &self.observers)
            .finish()
    }
}

impl StateMachine {
    /// Build a machine positioned at the definition's initial state.
    ///
    /// Transition targets that are not declared become terminal states.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::UnknownInitialState`] if the initial state
    /// is not declared.
    pub fn new(definition: MachineDefinition) -> Result<Self, MachineError> {
        let definition = definition.validated()?;
        Ok(StateMachine {
            current: definition.initial.clone(),
            definition,
            observers: Subscribers::new(),
            enter_actions: BTreeMap::new(),
            exit_actions: BTreeMap::new(),
        })
    }

    /// The current state name.
    pub fn state(&self) -> &str {
        &self.current
    }

    pub fn definition(&self) -> &MachineDefinition {
        &self.definition
    }

    /// Look up where `event` would lead without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidTransition`] if there is no such edge
    /// from the current state.
    pub fn can_transition(&self, event: &str) -> Result<&str, MachineError> {
        self.definition
            .target(&self.current, event)
            .ok_or_else(|| MachineError::InvalidTransition {
                state: self.current.clone(),
                event: event.to_string(),
            })
    }

    /// Take the edge labelled `event` and return the new state name.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidTransition`] if there is no such edge;
    /// the state is unchanged and nothing is notified.
    pub fn transition(&mut self, event: &str) -> Result<&str, MachineError> {
        let to = self.can_transition(event)?.to_string();
        let from = std::mem::replace(&mut self.current, to.clone());
        let record = Transition {
            from,
            to,
            event: event.to_string(),
        };

        log::debug!(
            "machine transition {} --{}--> {}",
            record.from,
            record.event,
            record.to
        );

        if let Some(actions) = self.exit_actions.get_mut(&record.from) {
            for action in actions.iter_mut() {
                action(&record);
            }
        }
        if let Some(actions) = self.enter_actions.get_mut(&record.to) {
            for action in actions.iter_mut() {
                action(&record);
            }
        }
        self.observers.notify(&record);

        Ok(&self.current)
    }

    /// Follow `events` from the current state without running actions or
    /// notifying observers, and return the state reached.
    ///
    /// Used to bring a machine in line with a recorded history. Either
    /// every event is taken or, on error, the machine does not move.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidTransition`] for the first event with
    /// no edge from the state reached so far.
    pub fn fast_forward<'a, I>(&mut self, events: I) -> Result<&str, MachineError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.current.clone();
        let mut taken = 0usize;
        for event in events {
            state = self
                .definition
                .target(&state, event)
                .ok_or_else(|| MachineError::InvalidTransition {
                    state: state.clone(),
                    event: event.to_string(),
                })?
                .to_string();
            taken += 1;
        }
        if taken > 0 {
            log::debug!(
                "machine fast-forwarded {taken} event(s) from {} to {state}",
                self.current
            );
        }
        self.current = state;
        Ok(&self.current)
    }

    /// Events that are legal from the current state, sorted.
    pub fn available_events(&self) -> Vec<&str> {
        self.definition.events(&self.current)
    }

    /// Whether the current state has no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        self.available_events().is_empty()
    }

    /// Observe every accepted transition.
    pub fn on_transition<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&Transition) + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Stop observing. Returns `false` if `id` is not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Run `action` each time the machine enters `state`.
    pub fn on_enter<F>(&mut self, state: &str, action: F)
    where
        F: FnMut(&Transition) + 'static,
    {
        self.enter_actions
            .entry(state.to_string())
            .or_default()
            .push(Box::new(action));
    }

    /// Run `action` each time the machine leaves `state`.
    pub fn on_exit<F>(&mut self, state: &str, action: F)
    where
        F: FnMut(&Transition) + 'static,
    {
        self.exit_actions
            .entry(state.to_string())
            .or_default()
            .push(Box::new(action));
    }
}
