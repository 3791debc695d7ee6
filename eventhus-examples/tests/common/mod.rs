use std::sync::Arc;

use eventhus::{CommandRegister, EventStore, Repository};
use eventhus_examples::banking::{event_register, wire_commands, Owner};
use eventhus_memory::InMemoryEventBus;

/// A wired bank over the given store.
pub struct Bank {
    pub events: InMemoryEventBus,
    pub repository: Arc<Repository>,
    pub commands: Arc<CommandRegister>,
}

impl Bank {
    pub fn over(store: Arc<dyn EventStore>) -> Self {
        let events = InMemoryEventBus::new();
        let repository = Arc::new(Repository::new(
            store,
            Arc::new(events.clone()),
            Arc::new(event_register().unwrap()),
        ));
        let mut commands = CommandRegister::new();
        wire_commands(&mut commands, &repository).unwrap();
        Self {
            events,
            repository,
            commands: Arc::new(commands),
        }
    }
}

pub fn owner(name: &str) -> Owner {
    Owner::try_new(name).unwrap()
}
