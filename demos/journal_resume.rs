//! Persisting a store to a journal and resuming it after a restart.

use serde::{Deserialize, Serialize};
use statefold::{Command, CommandError, Journal, ReplayableStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Tally {
    Add(u64),
    Reset,
}

impl Command for Tally {
    type State = u64;

    fn name(&self) -> &str {
        match self {
            Tally::Add(_) => "add",
            Tally::Reset => "reset",
        }
    }

    fn apply(&self, state: &u64) -> Result<u64, CommandError> {
        match self {
            Tally::Add(n) => state
                .checked_add(*n)
                .ok_or_else(|| CommandError::new("tally overflow")),
            Tally::Reset => Ok(0),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    {
        let mut store = ReplayableStore::<Tally>::open(Journal::open(dir.path())?, 0)?;
        for n in 1..=5 {
            store.execute(Tally::Add(n))?;
        }
        store.execute(Tally::Reset)?;
        store.execute(Tally::Add(7))?;
        println!("before restart: {} after {} events", store.state(), store.log().len());
    }

    let store = ReplayableStore::<Tally>::open(Journal::open(dir.path())?, 0)?;
    store.verify()?;
    println!("after restart:  {} after {} events", store.state(), store.log().len());
    println!("peak before reset: {}", store.state_at(4)?);
    Ok(())
}
