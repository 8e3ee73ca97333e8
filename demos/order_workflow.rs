//! An order workflow guarded by a state machine, with entry actions and
//! a transition observer.

use statefold::{MachineDefinition, StateMachine};

const ORDER: &str = r#"{
    "initialState": "draft",
    "states": {
        "draft":     { "transitions": { "submit": "pending" } },
        "pending":   { "transitions": { "approve": "approved", "reject": "rejected" } },
        "approved":  { "transitions": { "ship": "shipped", "cancel": "cancelled" } },
        "shipped":   { "transitions": { "deliver": "delivered" } },
        "delivered": {},
        "rejected":  {},
        "cancelled": {}
    }
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = StateMachine::new(MachineDefinition::from_json(ORDER)?)?;

    machine.on_enter("shipped", |t| println!("  (label printed for '{}')", t.event));
    let observer = machine.on_transition(|t| println!("{} --{}--> {}", t.from, t.event, t.to));

    machine.transition("submit")?;

    if let Err(e) = machine.transition("ship") {
        println!("rejected: {e}");
    }
    println!("allowed from {}: {:?}", machine.state(), machine.available_events());

    machine.transition("approve")?;
    machine.unsubscribe(observer);
    machine.transition("ship")?;
    machine.transition("deliver")?;

    println!("final state: {} (terminal: {})", machine.state(), machine.is_terminal());
    Ok(())
}
