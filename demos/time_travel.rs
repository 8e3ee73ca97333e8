//! Replaying to a specific point in the command history.
//!
//! Every `execute` is recorded; `state_at` rebuilds any earlier state by
//! folding the logged commands from the initial state.

use serde::Serialize;
use statefold::{Command, CommandError, ReplayableStore};
use std::collections::BTreeMap;

#[derive(Default, Clone, Debug, Serialize)]
struct Users {
    users: BTreeMap<String, User>,
}

#[derive(Clone, Debug, Serialize)]
struct User {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<u32>,
}

enum UserCommand {
    Add { id: String, name: String },
    SetAge { id: String, age: u32 },
}

impl Command for UserCommand {
    type State = Users;

    fn name(&self) -> &str {
        match self {
            UserCommand::Add { .. } => "add_user",
            UserCommand::SetAge { .. } => "set_age",
        }
    }

    fn apply(&self, state: &Users) -> Result<Users, CommandError> {
        let mut next = state.clone();
        match self {
            UserCommand::Add { id, name } => {
                next.users.insert(
                    id.clone(),
                    User {
                        id: id.clone(),
                        name: name.clone(),
                        age: None,
                    },
                );
            }
            UserCommand::SetAge { id, age } => {
                next.users
                    .get_mut(id)
                    .ok_or_else(|| CommandError::new(format!("no user '{id}'")))?
                    .age = Some(*age);
            }
        }
        Ok(next)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ReplayableStore::<UserCommand>::new(Users::default());
    store.subscribe(|state| println!("now {} user(s)", state.users.len()));

    store.execute(UserCommand::Add {
        id: "u1".into(),
        name: "John".into(),
    })?;
    store.execute(UserCommand::SetAge {
        id: "u1".into(),
        age: 30,
    })?;

    if let Err(e) = store.execute(UserCommand::SetAge {
        id: "u9".into(),
        age: 1,
    }) {
        println!("rejected: {e}");
    }

    println!("current:  {}", serde_json::to_string(store.state())?);
    for index in 0..store.log().len() {
        println!("after #{index}: {}", serde_json::to_string(&store.state_at(index)?)?);
    }
    Ok(())
}
