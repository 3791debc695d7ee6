//! Command register: binds command tags to handlers.
//!
//! Built once at start-up and shared with the command bus. Binding a tag
//! twice is refused so a lost handler shows up as a start-up error instead
//! of as silently misrouted commands.

use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::HandleCommand;
use crate::command::Command;
use crate::errors::{CommandError, CommandResult, RegistryError};
use crate::handler::{AggregateCommandHandler, CommandHandler};
use crate::repository::Repository;
use crate::types::CommandType;

/// Mapping from command tag to handler.
#[derive(Default)]
pub struct CommandRegister {
    handlers: HashMap<CommandType, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for CommandRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegister")
            .field("commands", &self.registered_commands())
            .finish()
    }
}

impl CommandRegister {
    /// Creates an empty register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to a command tag.
    ///
    /// # Errors
    /// `RegistryError::DuplicateRegistration` if the tag is already bound.
    pub fn add(
        &mut self,
        command_type: CommandType,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<&mut Self, RegistryError> {
        if self.handlers.contains_key(&command_type) {
            return Err(RegistryError::DuplicateRegistration(command_type));
        }
        tracing::debug!(command_type = %command_type, "registering command handler");
        self.handlers.insert(command_type, handler);
        Ok(self)
    }

    /// Binds `C` to an [`AggregateCommandHandler`] for aggregate `A`.
    pub fn wire<A, C>(&mut self, repository: Arc<Repository>) -> Result<&mut Self, RegistryError>
    where
        A: HandleCommand<C>,
        C: Command,
    {
        let command_type = C::command_type()?;
        self.add(
            command_type,
            Arc::new(AggregateCommandHandler::<A, C>::new(repository)),
        )
    }

    /// Looks up the handler for a command tag.
    ///
    /// # Errors
    /// `CommandError::NotRegistered` if nothing is bound to the tag.
    pub fn get(&self, command_type: &str) -> CommandResult<Arc<dyn CommandHandler>> {
        CommandType::try_new(command_type)
            .ok()
            .and_then(|key| self.handlers.get(&key).cloned())
            .ok_or_else(|| CommandError::NotRegistered(command_type.to_string()))
    }

    /// All bound tags, sorted.
    pub fn registered_commands(&self) -> Vec<CommandType> {
        let mut commands: Vec<_> = self.handlers.keys().cloned().collect();
        commands.sort();
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandEnvelope;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn handle(&self, _command: CommandEnvelope) -> CommandResult<()> {
            Ok(())
        }
    }

    fn tag(name: &str) -> CommandType {
        CommandType::try_new(name).unwrap()
    }

    #[test]
    fn bound_handlers_are_found() {
        let mut register = CommandRegister::new();
        register.add(tag("Open"), Arc::new(Noop)).unwrap();

        assert!(register.get("Open").is_ok());
        assert_eq!(register.registered_commands(), vec![tag("Open")]);
    }

    #[test]
    fn duplicate_tags_are_refused() {
        let mut register = CommandRegister::new();
        register.add(tag("Open"), Arc::new(Noop)).unwrap();

        let result = register.add(tag("Open"), Arc::new(Noop));
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateRegistration(ref t)) if t.as_ref() == "Open"
        ));
    }

    #[test]
    fn unknown_tags_are_not_registered() {
        let register = CommandRegister::new();
        assert!(matches!(
            register.get("Close"),
            Err(CommandError::NotRegistered(ref t)) if t == "Close"
        ));
        assert!(matches!(register.get(""), Err(CommandError::NotRegistered(_))));
    }
}
