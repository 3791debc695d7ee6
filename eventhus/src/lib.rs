//! # eventhus
//!
//! An event sourcing runtime: aggregates rebuilt from their own event
//! history, saved under optimistic concurrency, and driven by commands routed
//! through a synchronous or worker-pool command bus.
//!
//! ## Pieces
//!
//! - [`EventStore`] and [`EventBus`] are the ports a backend implements
//!   (see the `eventhus-memory` and `eventhus-postgres` crates).
//! - [`EventRegister`] maps stored event tags back to payload types.
//! - [`Repository`] loads aggregates by replay and saves new events with the
//!   expected-version check, then publishes them.
//! - [`CommandRegister`] binds command tags to handlers;
//!   [`AggregateCommandHandler`] is the generic load, check, decide, save
//!   handler.
//! - [`SyncCommandBus`] and [`AsyncCommandBus`] dispatch commands.
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let mut events = EventRegister::new();
//! events.set::<AccountEvent>()?;
//!
//! let repository = Arc::new(Repository::new(store, bus, Arc::new(events)));
//!
//! let mut commands = CommandRegister::new();
//! commands
//!     .wire::<Account, CreateAccount>(Arc::clone(&repository))?
//!     .wire::<Account, PerformDeposit>(Arc::clone(&repository))?;
//!
//! let bus = build_command_bus(CommandBusKind::Sync, Arc::new(commands));
//! bus.dispatch(CreateAccount::new(id, owner)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod command;
pub mod command_bus;
pub mod command_register;
pub mod config;
pub mod errors;
pub mod event;
pub mod event_bus;
pub mod event_register;
pub mod event_store;
pub mod handler;
mod macros;
pub mod metadata;
pub mod repository;
pub mod types;

pub use aggregate::{Aggregate, AggregateRoot, HandleCommand};
pub use command::{Command, CommandEnvelope};
pub use command_bus::{
    AsyncCommandBus, CommandBus, CommandBusExt, DispatchStats, SyncCommandBus, WorkerState,
};
pub use command_register::CommandRegister;
pub use config::{
    build_command_bus, CommandBusConfig, CommandBusKind, OverflowPolicy, QueueCapacity,
    WorkerCount,
};
pub use errors::{
    CommandError, CommandResult, EventBusError, EventStoreError, EventStoreResult, Operation,
    RegistryError,
};
pub use event::{DomainEvent, Event};
pub use event_bus::EventBus;
pub use event_register::EventRegister;
pub use event_store::EventStore;
pub use handler::{AggregateCommandHandler, CommandHandler};
pub use metadata::{CorrelationId, EventMetadata, UserId};
pub use repository::Repository;
pub use types::{
    AggregateId, AggregateType, CommandType, EventId, EventType, ParseAggregateIdError,
    Timestamp, Version,
};
