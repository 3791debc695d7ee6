//! Error types for eventhus.
//!
//! The errors are split by layer:
//!
//! - **EventStoreError**: persistence failures reported by an Event Store backend
//! - **EventBusError**: publication failures reported by an Event Bus backend
//! - **RegistryError**: misconfiguration or lookup failures in the event and
//!   command registers
//! - **CommandError**: everything a command dispatch can end in; this is what
//!   callers of a command bus see
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use eventhus::errors::CommandError;
//!
//! match bus.dispatch(deposit).await {
//!     Ok(()) => {}
//!     Err(CommandError::ConcurrencyConflict { .. }) => {
//!         // reload, re-validate against fresh state, resubmit
//!     }
//!     Err(CommandError::DomainRuleViolation(msg)) => display_error(&msg),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

use crate::types::{AggregateId, CommandType, Version};

/// Backend operation that failed, used to label infrastructure errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Connecting to the backend.
    Connect,
    /// Loading an aggregate's history.
    Load,
    /// Appending events with the version check.
    Save,
    /// Appending events without the version check.
    SafeSave,
    /// Beginning a database transaction.
    BeginTransaction,
    /// Committing a database transaction.
    CommitTransaction,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Load => write!(f, "load"),
            Self::Save => write!(f, "save"),
            Self::SafeSave => write!(f, "safe_save"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
        }
    }
}

/// Errors that can occur when interacting with the event store.
///
/// # Common Scenarios
///
/// - **VersionConflict**: another writer appended first; reload and re-decide
/// - **InvalidBatch**: the caller handed the store a malformed batch (a bug)
/// - **StoreFailure**: network or database trouble; nothing was appended
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStoreError {
    /// The persisted head version did not equal the expected version.
    #[error(
        "version conflict on aggregate {aggregate_id}: expected {expected}, but current is {current}"
    )]
    VersionConflict {
        /// The aggregate whose history moved on
        aggregate_id: AggregateId,
        /// The version the writer expected
        expected: Version,
        /// The version actually persisted
        current: Version,
    },

    /// The batch was empty, mixed aggregates, or was not numbered consecutively.
    #[error("invalid event batch: {0}")]
    InvalidBatch(String),

    /// An event could not be encoded for storage.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// A stored event could not be decoded back into an envelope.
    #[error("failed to decode stored event for aggregate {aggregate_id}: {detail}")]
    DeserializationFailed {
        /// The aggregate being loaded
        aggregate_id: AggregateId,
        /// What went wrong
        detail: String,
    },

    /// Infrastructure failure in the backing store.
    #[error("{operation} operation failed: {detail}")]
    StoreFailure {
        /// The operation that failed
        operation: Operation,
        /// Backend-specific detail
        detail: String,
    },

    /// The store is temporarily unavailable.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for event store operations.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Errors that can occur when publishing to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// The transport rejected or failed to deliver the event.
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// Errors raised by the event and command registers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A stored event carries a tag nothing was registered for.
    #[error("unknown event type: {event_type}")]
    UnknownEventType {
        /// The unregistered tag
        event_type: String,
    },

    /// A tag is already bound to a different payload type.
    #[error("event type '{event_type}' is already registered to {existing}, cannot bind it to {attempted}")]
    TypeConflict {
        /// The contested tag
        event_type: String,
        /// The payload type already holding the tag
        existing: &'static str,
        /// The payload type that tried to claim it
        attempted: &'static str,
    },

    /// A tag was decoded as a payload type other than the one it is registered to.
    #[error("event type '{event_type}' is registered to {registered}, not {requested}")]
    TypeMismatch {
        /// The tag being decoded
        event_type: String,
        /// The payload type the tag is registered to
        registered: &'static str,
        /// The payload type the caller asked for
        requested: &'static str,
    },

    /// The stored data does not fit the registered payload shape.
    #[error("failed to decode event of type '{event_type}': {detail}")]
    Decode {
        /// The tag being decoded
        event_type: String,
        /// The deserializer's complaint
        detail: String,
    },

    /// A tag failed validation (blank or too long).
    #[error("invalid type name '{name}': {detail}")]
    InvalidTypeName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        detail: String,
    },

    /// A handler is already bound to this command type.
    #[error("a handler is already registered for command type '{0}'")]
    DuplicateRegistration(CommandType),
}

/// Errors that can occur while dispatching and handling a command.
///
/// # Error Handling Strategy
///
/// - **NotFound**: the aggregate has no history where one was expected
/// - **ConcurrencyConflict**: reload, re-validate against fresh state, resubmit
/// - **InvalidState**: the command does not fit the aggregate's lifecycle
/// - **DomainRuleViolation**: show the message to the user
/// - **EventStore**: infrastructure trouble; nothing was committed
/// - **EventBus**: notification trouble in a custom handler
/// - **NotRegistered** / **Registry**: wiring bug, fix at start-up
/// - **QueueFull** / **BusClosed**: the async bus refused the command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The aggregate has no history.
    #[error("aggregate {0} not found")]
    NotFound(AggregateId),

    /// The expected version did not match, either at the handler pre-check or
    /// at the store's atomic check.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {}", display_version(.actual))]
    ConcurrencyConflict {
        /// The contested aggregate
        aggregate_id: AggregateId,
        /// The version the command (or writer) expected
        expected: Version,
        /// The version actually observed, when known
        actual: Option<Version>,
    },

    /// The command does not fit the aggregate's lifecycle, e.g. creating an
    /// aggregate that already exists.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A business rule was violated during command execution.
    #[error("domain rule violation: {0}")]
    DomainRuleViolation(String),

    /// An error occurred in the event store while executing the command.
    #[error("event store error: {0}")]
    EventStore(EventStoreError),

    /// An error occurred on the event bus. The repository only logs publish
    /// failures; custom handlers that publish directly may surface them.
    #[error("event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// No handler is bound to the command's type.
    #[error("no handler registered for command type '{0}'")]
    NotRegistered(String),

    /// A register rejected an operation.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The async command queue is full and the bus rejects rather than waits.
    #[error("command queue is full")]
    QueueFull,

    /// The async command bus has been shut down.
    #[error("command bus is shut down")]
    BusClosed,

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

fn display_version(version: &Option<Version>) -> String {
    version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

impl CommandError {
    /// Whether this error is an optimistic-concurrency conflict.
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Whether this error is a business-rule rejection by the aggregate.
    pub const fn is_domain_rule_violation(&self) -> bool {
        matches!(self, Self::DomainRuleViolation(_))
    }
}

impl From<EventStoreError> for CommandError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::VersionConflict {
                aggregate_id,
                expected,
                current,
            } => Self::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: Some(current),
            },
            other => Self::EventStore(other),
        }
    }
}

/// Result type for command execution.
pub type CommandResult<T> = Result<T, CommandError>;
