#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use statefold::{Command, CommandError, MachineDefinition};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub users: BTreeMap<String, User>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserChanges {
    pub name: Option<String>,
    pub age: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UserCommand {
    AddUser { id: String, name: String },
    UpdateUser { id: String, changes: UserChanges },
    RemoveUser { id: String },
}

pub fn add_user(id: &str, name: &str) -> UserCommand {
    UserCommand::AddUser {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn set_age(id: &str, age: u32) -> UserCommand {
    UserCommand::UpdateUser {
        id: id.to_string(),
        changes: UserChanges {
            name: None,
            age: Some(age),
        },
    }
}

impl Command for UserCommand {
    type State = UserState;

    fn name(&self) -> &str {
        match self {
            UserCommand::AddUser { .. } => "add_user",
            UserCommand::UpdateUser { .. } => "update_user",
            UserCommand::RemoveUser { .. } => "remove_user",
        }
    }

    fn apply(&self, state: &UserState) -> Result<UserState, CommandError> {
        let mut next = state.clone();
        match self {
            UserCommand::AddUser { id, name } => {
                next.users.insert(
                    id.clone(),
                    User {
                        id: id.clone(),
                        name: name.clone(),
                        age: None,
                    },
                );
            }
            UserCommand::UpdateUser { id, changes } => {
                let user = next
                    .users
                    .get_mut(id)
                    .ok_or_else(|| CommandError::new(format!("no user '{id}'")))?;
                if let Some(name) = &changes.name {
                    user.name = name.clone();
                }
                if let Some(age) = changes.age {
                    user.age = Some(age);
                }
            }
            UserCommand::RemoveUser { id } => {
                if next.users.remove(id).is_none() {
                    return Err(CommandError::new(format!("no user '{id}'")));
                }
            }
        }
        Ok(next)
    }
}

/// Integer counter; `Fail` always errors so atomicity can be tested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Counter {
    Add(i64),
    Fail,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("counter refused the command")]
pub struct Refused;

impl Command for Counter {
    type State = i64;

    fn name(&self) -> &str {
        match self {
            Counter::Add(_) => "add",
            Counter::Fail => "fail",
        }
    }

    fn apply(&self, state: &i64) -> Result<i64, CommandError> {
        match self {
            Counter::Add(n) => Ok(state + n),
            Counter::Fail => Err(CommandError::new(Refused)),
        }
    }

    fn compensate(&self) -> Option<Self> {
        match self {
            Counter::Add(n) => Some(Counter::Add(-n)),
            Counter::Fail => None,
        }
    }
}

/// Order workflow command; each variant requires the machine event of the
/// same name and appends it to the state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrderCommand {
    Submit,
    Approve,
    Reject,
    Ship,
    Cancel,
    Deliver,
    Note(String),
}

impl Command for OrderCommand {
    type State = Vec<String>;

    fn name(&self) -> &str {
        match self {
            OrderCommand::Submit => "submit",
            OrderCommand::Approve => "approve",
            OrderCommand::Reject => "reject",
            OrderCommand::Ship => "ship",
            OrderCommand::Cancel => "cancel",
            OrderCommand::Deliver => "deliver",
            OrderCommand::Note(_) => "note",
        }
    }

    fn apply(&self, state: &Vec<String>) -> Result<Vec<String>, CommandError> {
        let mut next = state.clone();
        match self {
            OrderCommand::Note(text) => next.push(format!("note:{text}")),
            other => next.push(other.name().to_string()),
        }
        Ok(next)
    }

    fn event(&self) -> Option<&str> {
        match self {
            OrderCommand::Note(_) => None,
            other => Some(other.name()),
        }
    }
}

pub const ORDER_JSON: &str = r#"{
    "initialState": "draft",
    "states": {
        "draft":     { "transitions": { "submit": "pending" } },
        "pending":   { "transitions": { "approve": "approved", "reject": "rejected" } },
        "approved":  { "transitions": { "ship": "shipped", "cancel": "cancelled" } },
        "shipped":   { "transitions": { "deliver": "delivered", "return": "returned" } },
        "delivered": { "transitions": { "return": "returned" } },
        "rejected":  {},
        "cancelled": {},
        "returned":  {}
    }
}"#;

pub fn order_definition() -> MachineDefinition {
    MachineDefinition::from_json(ORDER_JSON).unwrap()
}

/// Shared, clonable list of everything a callback saw.
pub fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(&T) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |value: &T| sink.borrow_mut().push(value.clone()))
}

/// Counts notifications.
pub fn counter_callback<T: 'static>() -> (Rc<RefCell<usize>>, impl FnMut(&T) + 'static) {
    let count = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&count);
    (count, move |_: &T| *sink.borrow_mut() += 1)
}
