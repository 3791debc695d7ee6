//! Commands and the type-erased envelope the buses carry.
//!
//! A command states caller intent against one aggregate and carries the
//! version the caller believes that aggregate is at. `Version::initial()`
//! marks a creation command.

use std::any::{type_name, Any};

use crate::errors::{CommandError, CommandResult, RegistryError};
use crate::metadata::EventMetadata;
use crate::types::{AggregateId, CommandType, Version};

/// A request to change one aggregate.
pub trait Command: Send + Sync + 'static {
    /// Tag the command register binds a handler to.
    const COMMAND_TYPE: &'static str;

    /// The target aggregate.
    fn aggregate_id(&self) -> AggregateId;

    /// The version the caller believes the aggregate is at.
    fn version(&self) -> Version;

    /// The validated form of [`Command::COMMAND_TYPE`].
    fn command_type() -> Result<CommandType, RegistryError> {
        CommandType::try_new(Self::COMMAND_TYPE).map_err(|error| RegistryError::InvalidTypeName {
            name: Self::COMMAND_TYPE.to_string(),
            detail: error.to_string(),
        })
    }
}

/// A command with its type erased, plus the routing fields a bus needs.
pub struct CommandEnvelope {
    command_type: &'static str,
    aggregate_id: AggregateId,
    version: Version,
    metadata: EventMetadata,
    payload: Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("command_type", &self.command_type)
            .field("aggregate_id", &self.aggregate_id)
            .field("version", &self.version)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl CommandEnvelope {
    /// Wraps a command with fresh metadata.
    pub fn new<C: Command>(command: C) -> Self {
        Self {
            command_type: C::COMMAND_TYPE,
            aggregate_id: command.aggregate_id(),
            version: command.version(),
            metadata: EventMetadata::new(),
            payload: Box::new(command),
        }
    }

    /// Replaces the metadata every resulting event will carry.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The command's tag.
    pub const fn command_type(&self) -> &'static str {
        self.command_type
    }

    /// The target aggregate.
    pub const fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// The version the caller believes the aggregate is at.
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Whether this command creates its aggregate.
    pub fn is_creation(&self) -> bool {
        self.version.is_initial()
    }

    /// Metadata for the events this command causes.
    pub const fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Borrows the command as `C`, if that is what it holds.
    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.payload.downcast_ref::<C>()
    }

    /// Unwraps the command as `C` together with its metadata.
    ///
    /// # Errors
    /// `CommandError::Internal` when the envelope holds another type, which
    /// means a handler was registered under the wrong tag.
    pub fn downcast<C: Command>(self) -> CommandResult<(C, EventMetadata)> {
        let command_type = self.command_type;
        let metadata = self.metadata;
        self.payload
            .downcast::<C>()
            .map(|command| (*command, metadata))
            .map_err(|_| {
                CommandError::Internal(format!(
                    "command '{command_type}' cannot be handled as {}",
                    type_name::<C>()
                ))
            })
    }
}
