mod common;

use common::{
    add_user, counter_callback, order_definition, recorder, set_age, Counter, OrderCommand,
    Refused, User, UserCommand, UserState,
};
use statefold::{
    Command, CommandError, Event, EventLog, EventSink, FnCommand, ReplayableStore, StateMachine,
    StoreError, Transition,
};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

fn user(id: &str, name: &str, age: Option<u32>) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        age,
    }
}

#[test]
fn test_user_store_scenario() {
    let mut store = ReplayableStore::<UserCommand>::new(UserState::default());
    let (count, observer) = counter_callback::<UserState>();
    store.subscribe(observer);

    store.execute(add_user("u1", "John")).unwrap();
    store.execute(set_age("u1", 30)).unwrap();

    assert_eq!(store.state().users["u1"], user("u1", "John", Some(30)));
    assert_eq!(*count.borrow(), 2);
    assert_eq!(store.log().len(), 2);

    let previous = store.state_at(0).unwrap();
    assert_eq!(previous.users["u1"], user("u1", "John", None));

    // The time-travelled state serializes without an age key.
    let json = serde_json::to_value(&previous).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"users": {"u1": {"id": "u1", "name": "John"}}})
    );
}

#[test]
fn test_execute_returns_new_state() {
    let mut store = ReplayableStore::<Counter>::new(0);
    assert_eq!(*store.execute(Counter::Add(4)).unwrap(), 4);
    assert_eq!(*store.execute(Counter::Add(-1)).unwrap(), 3);
    assert_eq!(*store.state(), 3);
    assert_eq!(*store.initial_state(), 0);
}

#[test]
fn test_subscribers_receive_new_state() {
    let mut store = ReplayableStore::<Counter>::new(0);
    let (seen, observer) = recorder::<i64>();
    store.subscribe(observer);

    store.execute(Counter::Add(1)).unwrap();
    store.execute(Counter::Add(10)).unwrap();

    assert_eq!(*seen.borrow(), vec![1, 11]);
}

#[test]
fn test_failed_command_is_atomic() {
    let mut store = ReplayableStore::<Counter>::new(0);
    let (count, observer) = counter_callback::<i64>();
    store.subscribe(observer);
    store.execute(Counter::Add(2)).unwrap();

    let err = store.execute(Counter::Fail).unwrap_err();

    match err {
        StoreError::Command { command, source } => {
            assert_eq!(command, "fail");
            assert_eq!(source.downcast_ref::<Refused>(), Some(&Refused));
        }
        other => panic!("expected command error, got {other:?}"),
    }
    assert_eq!(*store.state(), 2);
    assert_eq!(store.log().len(), 1);
    assert_eq!(*count.borrow(), 1);

    // The store is usable afterwards without any reset.
    store.execute(Counter::Add(1)).unwrap();
    assert_eq!(*store.state(), 3);
    assert_eq!(store.log().len(), 2);
}

#[test]
fn test_command_error_for_missing_user() {
    let mut store = ReplayableStore::<UserCommand>::new(UserState::default());
    let err = store.execute(set_age("ghost", 1)).unwrap_err();
    assert_eq!(err.to_string(), "command 'update_user' failed: no user 'ghost'");
    assert!(store.log().is_empty());
}

#[test]
fn test_unsubscribe_correctness() {
    let mut store = ReplayableStore::<Counter>::new(0);
    let (first_count, first) = counter_callback::<i64>();
    let (second_count, second) = counter_callback::<i64>();
    let first_id = store.subscribe(first);
    store.subscribe(second);

    assert!(store.unsubscribe(first_id));
    store.execute(Counter::Add(1)).unwrap();
    assert_eq!(*first_count.borrow(), 0);
    assert_eq!(*second_count.borrow(), 1);

    let sink = Rc::clone(&first_count);
    store.subscribe(move |_| *sink.borrow_mut() += 1);
    store.execute(Counter::Add(1)).unwrap();
    assert_eq!(*first_count.borrow(), 1);
    assert_eq!(*second_count.borrow(), 2);
}

#[test]
fn test_log_is_gapless() {
    let mut store = ReplayableStore::<Counter>::new(0);
    for n in 1..=10 {
        store.execute(Counter::Add(n)).unwrap();
    }

    let events = store.log().events();
    assert_eq!(events.len(), 10);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64);
    }

    let fourth = store.log().event_at(3).unwrap();
    assert_eq!(fourth.command, Counter::Add(4));
    assert_eq!(fourth.state, 1 + 2 + 3 + 4);
}

#[test]
fn test_index_out_of_range() {
    let mut store = ReplayableStore::<Counter>::new(0);
    store.execute(Counter::Add(1)).unwrap();

    let err = store.state_at(1).unwrap_err();
    assert!(matches!(
        err,
        StoreError::IndexOutOfRange(statefold::IndexOutOfRange { index: 1, len: 1 })
    ));
    assert!(store.log().event_at(5).is_err());

    let empty: ReplayableStore<Counter> = ReplayableStore::new(0);
    assert!(empty.state_at(0).is_err());
}

#[test]
fn test_state_at_replays_from_commands() {
    // A log whose cached states are wrong: replay must ignore them.
    let events = vec![
        Event::new(0, Counter::Add(1), 100).with_ts(1),
        Event::new(1, Counter::Add(2), 200).with_ts(2),
    ];
    let log = EventLog::from_events(events).unwrap();
    let store = ReplayableStore::<Counter>::with_log(0, log).unwrap();

    assert_eq!(store.state_at(0).unwrap(), 1);
    assert_eq!(store.state_at(1).unwrap(), 3);
    assert_eq!(*store.state(), 3);

    let err = store.verify().unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn test_rebuild_and_verify() {
    let mut store = ReplayableStore::<UserCommand>::new(UserState::default());
    store.execute(add_user("u1", "John")).unwrap();
    store.execute(add_user("u2", "Ada")).unwrap();
    store.execute(UserCommand::RemoveUser { id: "u1".into() }).unwrap();

    assert_eq!(store.rebuild().unwrap(), *store.state());
    store.verify().unwrap();
}

#[test]
fn test_with_log_resumes_state() {
    let mut original = ReplayableStore::<Counter>::new(0);
    for n in [5, 6, 7] {
        original.execute(Counter::Add(n)).unwrap();
    }

    let mut resumed = ReplayableStore::<Counter>::with_log(0, original.log().clone()).unwrap();
    assert_eq!(*resumed.state(), 18);

    resumed.execute(Counter::Add(2)).unwrap();
    assert_eq!(resumed.log().len(), 4);
    assert_eq!(resumed.log().event_at(3).unwrap().seq, 3);
    assert_eq!(resumed.state_at(0).unwrap(), 5);
}

#[test]
fn test_revert_appends_compensation() {
    let mut store = ReplayableStore::<Counter>::new(0);
    let (seen, observer) = recorder::<i64>();
    store.subscribe(observer);
    store.execute(Counter::Add(5)).unwrap();
    store.execute(Counter::Add(3)).unwrap();

    assert_eq!(*store.revert(0).unwrap(), 3);

    assert_eq!(store.log().len(), 3);
    assert_eq!(store.log().event_at(2).unwrap().command, Counter::Add(-5));
    assert_eq!(store.state_at(1).unwrap(), 8);
    assert_eq!(*seen.borrow(), vec![5, 8, 3]);
    store.verify().unwrap();
}

#[test]
fn test_revert_errors_leave_store_unchanged() {
    let mut store = ReplayableStore::<UserCommand>::new(UserState::default());
    store.execute(add_user("u1", "John")).unwrap();

    let err = store.revert(0).unwrap_err();
    assert!(matches!(err, StoreError::NotReversible { seq: 0, .. }));
    assert_eq!(
        err.to_string(),
        "command 'add_user' at sequence 0 has no compensation"
    );

    let err = store.revert(4).unwrap_err();
    assert!(matches!(err, StoreError::IndexOutOfRange(_)));
    assert_eq!(store.log().len(), 1);
}

#[test]
fn test_from_events_rejects_gaps() {
    let events = vec![
        Event::new(0, Counter::Add(1), 1),
        Event::new(2, Counter::Add(1), 2),
    ];
    let err = EventLog::from_events(events).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn test_fn_command() {
    fn rename(state: &UserState, payload: &(String, String)) -> Result<UserState, CommandError> {
        let mut next = state.clone();
        let user = next
            .users
            .get_mut(&payload.0)
            .ok_or_else(|| CommandError::new("unknown user"))?;
        user.name = payload.1.clone();
        Ok(next)
    }

    let mut state = UserState::default();
    state.users.insert("u1".into(), user("u1", "John", None));
    let mut store = ReplayableStore::<FnCommand<UserState, (String, String)>>::new(state);

    let cmd = FnCommand::new("rename", ("u1".to_string(), "Johnny".to_string()), rename);
    assert_eq!(cmd.name(), "rename");
    assert_eq!(cmd.payload().1, "Johnny");
    store.execute(cmd.clone()).unwrap();

    assert_eq!(store.state().users["u1"].name, "Johnny");
    assert_eq!(store.log().event_at(0).unwrap().command.name(), "rename");

    let missing = FnCommand::new("rename", ("u9".to_string(), "X".to_string()), rename);
    assert!(store.execute(missing).is_err());
    assert_eq!(store.log().len(), 1);
}

#[test]
fn test_guarded_store_rejects_illegal_event() {
    let machine = StateMachine::new(order_definition()).unwrap();
    let mut store = ReplayableStore::<OrderCommand>::new(Vec::new())
        .with_guard(machine)
        .unwrap();
    let (count, observer) = counter_callback::<Vec<String>>();
    store.subscribe(observer);

    let err = store.execute(OrderCommand::Ship).unwrap_err();
    assert!(matches!(err, StoreError::Transition(_)));
    assert!(store.log().is_empty());
    assert!(store.state().is_empty());
    assert_eq!(store.machine().unwrap().state(), "draft");
    assert_eq!(*count.borrow(), 0);

    store.execute(OrderCommand::Submit).unwrap();
    store.execute(OrderCommand::Note("rush".into())).unwrap();
    store.execute(OrderCommand::Approve).unwrap();
    store.execute(OrderCommand::Ship).unwrap();

    assert_eq!(store.machine().unwrap().state(), "shipped");
    assert_eq!(
        *store.state(),
        vec!["submit", "note:rush", "approve", "ship"]
    );
    assert_eq!(*count.borrow(), 4);
    assert_eq!(store.state_at(1).unwrap(), vec!["submit", "note:rush"]);
}

#[test]
fn test_guard_observers_fire_through_store() {
    let machine = StateMachine::new(order_definition()).unwrap();
    let mut store = ReplayableStore::<OrderCommand>::new(Vec::new())
        .with_guard(machine)
        .unwrap();
    let (seen, observer) = recorder::<Transition>();
    store.machine_mut().unwrap().on_transition(observer);

    store.execute(OrderCommand::Submit).unwrap();
    store.execute(OrderCommand::Reject).unwrap();
    assert!(store.execute(OrderCommand::Approve).is_err());

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].from, "pending");
    assert_eq!(seen[1].to, "rejected");
    assert_eq!(seen[1].event, "reject");
}

#[test]
fn test_guard_attached_after_history_catches_up() {
    let mut original = ReplayableStore::<OrderCommand>::new(Vec::new());
    original.execute(OrderCommand::Submit).unwrap();
    original.execute(OrderCommand::Approve).unwrap();

    let store = ReplayableStore::<OrderCommand>::with_log(Vec::new(), original.log().clone())
        .unwrap()
        .with_guard(StateMachine::new(order_definition()).unwrap())
        .unwrap();

    assert_eq!(store.machine().unwrap().state(), "approved");
    assert_eq!(store.machine().unwrap().available_events(), vec!["cancel", "ship"]);
}

#[test]
fn test_unguarded_store_ignores_events() {
    let mut store = ReplayableStore::<OrderCommand>::new(Vec::new());
    store.execute(OrderCommand::Ship).unwrap();
    assert!(store.machine().is_none());
    assert_eq!(*store.state(), vec!["ship"]);
}

struct FailingSink;

impl EventSink<Counter, i64> for FailingSink {
    fn persist(&mut self, _event: &Event<Counter, i64>) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

#[test]
fn test_sink_failure_is_atomic() {
    let mut store = ReplayableStore::<Counter>::new(0).with_sink(FailingSink);
    let (count, observer) = counter_callback::<i64>();
    store.subscribe(observer);

    let err = store.execute(Counter::Add(1)).unwrap_err();

    assert!(matches!(err, StoreError::Io(_)));
    assert_eq!(*store.state(), 0);
    assert!(store.log().is_empty());
    assert_eq!(*count.borrow(), 0);
}

#[derive(Default)]
struct RecordingSink(Rc<RefCell<Vec<u64>>>);

impl EventSink<Counter, i64> for RecordingSink {
    fn persist(&mut self, event: &Event<Counter, i64>) -> io::Result<()> {
        self.0.borrow_mut().push(event.seq);
        Ok(())
    }
}

#[test]
fn test_sink_sees_each_committed_event() {
    let seqs = Rc::new(RefCell::new(Vec::new()));
    let mut store = ReplayableStore::<Counter>::new(0).with_sink(RecordingSink(Rc::clone(&seqs)));

    store.execute(Counter::Add(1)).unwrap();
    assert!(store.execute(Counter::Fail).is_err());
    store.execute(Counter::Add(1)).unwrap();

    assert_eq!(*seqs.borrow(), vec![0, 1]);
}
