//! A tiny counter domain shared by the integration tests.

use std::sync::Arc;

use eventhus::{
    require, Aggregate, AggregateId, Command, CommandRegister, CommandResult, DomainEvent,
    EventBus, EventRegister, EventStore, HandleCommand, Repository, Version,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counter {
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CounterEvent {
    Opened,
    Incremented { by: u64 },
}

impl DomainEvent for CounterEvent {
    fn event_types() -> Vec<&'static str> {
        vec!["Opened", "Incremented"]
    }
}

impl Aggregate for Counter {
    const AGGREGATE_TYPE: &'static str = "counter";
    type Event = CounterEvent;

    fn apply(&mut self, event: &CounterEvent) {
        match event {
            CounterEvent::Opened => {}
            CounterEvent::Incremented { by } => self.total += by,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Open {
    pub id: AggregateId,
}

impl Command for Open {
    const COMMAND_TYPE: &'static str = "Open";

    fn aggregate_id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        Version::initial()
    }
}

#[derive(Debug, Clone)]
pub struct Increment {
    pub id: AggregateId,
    pub version: Version,
    pub by: u64,
}

impl Command for Increment {
    const COMMAND_TYPE: &'static str = "Increment";

    fn aggregate_id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }
}

impl HandleCommand<Open> for Counter {
    fn handle(&self, _command: &Open) -> CommandResult<Vec<CounterEvent>> {
        Ok(vec![CounterEvent::Opened])
    }
}

impl HandleCommand<Increment> for Counter {
    fn handle(&self, command: &Increment) -> CommandResult<Vec<CounterEvent>> {
        require!(command.by > 0, "increment must be positive");
        Ok(vec![CounterEvent::Incremented { by: command.by }])
    }
}

pub fn counter_events() -> Arc<EventRegister> {
    let mut events = EventRegister::new();
    events.set::<CounterEvent>().unwrap();
    Arc::new(events)
}

pub fn repository(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>) -> Arc<Repository> {
    Arc::new(Repository::new(store, bus, counter_events()))
}

pub fn counter_commands(repository: &Arc<Repository>) -> Arc<CommandRegister> {
    let mut commands = CommandRegister::new();
    commands
        .wire::<Counter, Open>(Arc::clone(repository))
        .unwrap()
        .wire::<Counter, Increment>(Arc::clone(repository))
        .unwrap();
    Arc::new(commands)
}
