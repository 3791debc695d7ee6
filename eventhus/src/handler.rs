//! Command handlers.
//!
//! [`AggregateCommandHandler`] is the generic handler every wired command
//! uses: load the target, check lifecycle and version, decide, save.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::aggregate::HandleCommand;
use crate::command::{Command, CommandEnvelope};
use crate::errors::{CommandError, CommandResult};
use crate::repository::Repository;

/// Executes one kind of command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles a command to completion.
    async fn handle(&self, command: CommandEnvelope) -> CommandResult<()>;
}

/// Handles command `C` against aggregate `A` through a repository.
pub struct AggregateCommandHandler<A, C> {
    repository: Arc<Repository>,
    _marker: PhantomData<fn() -> (A, C)>,
}

impl<A, C> AggregateCommandHandler<A, C> {
    /// Creates a handler saving through `repository`.
    pub const fn new(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            _marker: PhantomData,
        }
    }
}

impl<A, C> std::fmt::Debug for AggregateCommandHandler<A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateCommandHandler")
            .field("aggregate", &std::any::type_name::<A>())
            .field("command", &std::any::type_name::<C>())
            .finish()
    }
}

#[async_trait]
impl<A, C> CommandHandler for AggregateCommandHandler<A, C>
where
    A: HandleCommand<C>,
    C: Command,
{
    #[instrument(
        name = "command.handle",
        skip(self, command),
        fields(
            command_type = C::COMMAND_TYPE,
            aggregate_id = %command.aggregate_id(),
            version = %command.version()
        )
    )]
    async fn handle(&self, command: CommandEnvelope) -> CommandResult<()> {
        let (command, metadata) = command.downcast::<C>()?;
        let aggregate_id = command.aggregate_id();
        let expected = command.version();

        let mut root = self.repository.load_or_new::<A>(aggregate_id).await?;

        if expected.is_initial() && root.exists() {
            return Err(CommandError::InvalidState(format!(
                "{} {aggregate_id} already exists at version {}",
                A::AGGREGATE_TYPE,
                root.version()
            )));
        }
        if !expected.is_initial() && !root.exists() {
            return Err(CommandError::InvalidState(format!(
                "{} {aggregate_id} does not exist",
                A::AGGREGATE_TYPE
            )));
        }
        if root.version() != expected {
            return Err(CommandError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: Some(root.version()),
            });
        }

        let events = <A as HandleCommand<C>>::handle(root.state(), &command)?;
        let saved = self.repository.save(&mut root, events, &metadata).await?;

        debug!(events = saved.len(), version = %root.version(), "command handled");
        Ok(())
    }
}
