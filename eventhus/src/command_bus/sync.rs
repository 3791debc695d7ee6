use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::CommandBus;
use crate::command::CommandEnvelope;
use crate::command_register::CommandRegister;
use crate::errors::CommandResult;

/// Handles each command on the caller's task and returns its result.
#[derive(Debug, Clone)]
pub struct SyncCommandBus {
    register: Arc<CommandRegister>,
}

impl SyncCommandBus {
    /// Creates a bus dispatching through `register`.
    pub const fn new(register: Arc<CommandRegister>) -> Self {
        Self { register }
    }
}

#[async_trait]
impl CommandBus for SyncCommandBus {
    #[instrument(
        name = "command_bus.sync",
        skip(self, command),
        fields(command_type = command.command_type(), aggregate_id = %command.aggregate_id())
    )]
    async fn handle_command(&self, command: CommandEnvelope) -> CommandResult<()> {
        let handler = self.register.get(command.command_type())?;
        handler.handle(command).await
    }
}
