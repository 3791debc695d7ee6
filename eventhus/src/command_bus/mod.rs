//! Command dispatch.
//!
//! Two dispatch models share the [`CommandBus`] port:
//!
//! - [`SyncCommandBus`] handles a command inline and returns its result. It
//!   gives each caller a total order of processing and is the reference
//!   model.
//! - [`AsyncCommandBus`] queues commands for a pool of workers and returns
//!   once a command is accepted. Handler results are only visible through
//!   side effects, logs, and [`DispatchStats`].

use async_trait::async_trait;

use crate::command::{Command, CommandEnvelope};
use crate::errors::CommandResult;
use crate::metadata::EventMetadata;

mod sync;
mod worker_pool;

pub use sync::SyncCommandBus;
pub use worker_pool::{AsyncCommandBus, DispatchStats, WorkerState};

/// Routes commands to their handlers.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Submits a command.
    ///
    /// The sync bus returns the handler's result. The async bus returns as
    /// soon as the command is queued.
    async fn handle_command(&self, command: CommandEnvelope) -> CommandResult<()>;

    /// Stops intake and waits until every accepted command has been handled.
    ///
    /// Nothing is ever pending on a bus that handles commands inline, so the
    /// default does nothing.
    async fn shutdown(&self) {}
}

/// Typed submission helpers for every [`CommandBus`].
#[async_trait]
pub trait CommandBusExt: CommandBus {
    /// Wraps and submits a typed command.
    async fn dispatch<C: Command>(&self, command: C) -> CommandResult<()> {
        self.handle_command(CommandEnvelope::new(command)).await
    }

    /// Wraps and submits a typed command with caller-supplied metadata.
    async fn dispatch_with_metadata<C: Command>(
        &self,
        command: C,
        metadata: EventMetadata,
    ) -> CommandResult<()> {
        self.handle_command(CommandEnvelope::new(command).with_metadata(metadata))
            .await
    }
}

impl<B: CommandBus + ?Sized> CommandBusExt for B {}
