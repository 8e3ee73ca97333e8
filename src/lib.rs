//! Event-sourced state with replay, time travel and a transition guard.
//!
//! Application state is a fold over a log of commands. A
//! [`ReplayableStore`] applies each [`Command`] through its pure `apply`,
//! records the result in an append-only [`EventLog`], and notifies
//! subscribers. Any past state can be rebuilt by replaying the log.
//! A [`StateMachine`] can guard which commands are legal, and a
//! [`Journal`] can persist the log as JSON lines.
//!
//! ```
//! use statefold::{Command, CommandError, MachineDefinition, ReplayableStore, StateMachine};
//!
//! #[derive(Debug, Clone)]
//! enum Order {
//!     Submit,
//!     Approve,
//! }
//!
//! impl Command for Order {
//!     type State = Vec<&'static str>;
//!
//!     fn name(&self) -> &str {
//!         match self {
//!             Order::Submit => "submit",
//!             Order::Approve => "approve",
//!         }
//!     }
//!
//!     fn apply(&self, state: &Self::State) -> Result<Self::State, CommandError> {
//!         let mut next = state.clone();
//!         next.push(self.name_static());
//!         Ok(next)
//!     }
//!
//!     fn event(&self) -> Option<&str> {
//!         Some(self.name())
//!     }
//! }
//!
//! impl Order {
//!     fn name_static(&self) -> &'static str {
//!         match self {
//!             Order::Submit => "submit",
//!             Order::Approve => "approve",
//!         }
//!     }
//! }
//!
//! let machine = StateMachine::new(
//!     MachineDefinition::new("draft")
//!         .transition("draft", "submit", "pending")
//!         .transition("pending", "approve", "approved"),
//! )
//! .unwrap();
//!
//! let mut store = ReplayableStore::<Order>::new(Vec::new())
//!     .with_guard(machine)
//!     .unwrap();
//! assert!(store.execute(Order::Approve).is_err());
//! store.execute(Order::Submit).unwrap();
//! store.execute(Order::Approve).unwrap();
//!
//! assert_eq!(store.machine().unwrap().state(), "approved");
//! assert_eq!(store.state_at(0).unwrap(), vec!["submit"]);
//! ```

mod command;
mod error;
mod event;
mod journal;
mod log;
mod machine;
mod store;
mod subscribers;

pub use command::{ApplyFn, Command, FnCommand};
pub use error::{CommandError, IndexOutOfRange, MachineError, Result, StoreError};
pub use event::Event;
pub use journal::{Journal, JournalBuilder, LockMode};
pub use log::EventLog;
pub use machine::{MachineDefinition, StateDef, StateMachine, Transition};
pub use store::{EventSink, ReplayableStore};
pub use subscribers::{SubscriptionId, Subscribers};
