//! Configuration with type-safe validation.
//!
//! Parameters use `nutype` validation so an out-of-range value is rejected
//! when the configuration is built or deserialized, never at dispatch time.
//! Everything derives `serde::Deserialize`; a host process can load it from
//! whatever format it already uses.

use std::sync::Arc;

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::command_bus::{AsyncCommandBus, CommandBus, SyncCommandBus};
use crate::command_register::CommandRegister;

/// Number of workers in the async command bus.
///
/// Validated to be between 1 and 1024.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1024),
    default = 4,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Default,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct WorkerCount(usize);

/// Capacity of the async command bus queue.
///
/// Validated to be between 1 and 1,000,000 queued commands.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    default = 1024,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Default,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct QueueCapacity(usize);

/// What the async bus does when its queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The submitter waits for capacity.
    #[default]
    Block,
    /// The submitter gets `CommandError::QueueFull`.
    Reject,
}

/// Async command bus settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandBusConfig {
    /// Number of workers pulling from the queue
    pub workers: WorkerCount,
    /// Maximum number of accepted, not yet dequeued commands
    pub queue_capacity: QueueCapacity,
    /// Behaviour when the queue is full
    pub overflow: OverflowPolicy,
}

impl CommandBusConfig {
    /// Sets the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: QueueCapacity) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the overflow policy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Which dispatch model to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandBusKind {
    /// Handle every command inline on the caller's task.
    #[default]
    Sync,
    /// Queue commands for a worker pool.
    Async(CommandBusConfig),
}

/// Builds the configured command bus over a register.
///
/// The async variant spawns its workers, so it must be called from within a
/// tokio runtime. Call [`CommandBus::shutdown`] before exiting so queued
/// commands are handled.
pub fn build_command_bus(kind: CommandBusKind, register: Arc<CommandRegister>) -> Arc<dyn CommandBus> {
    match kind {
        CommandBusKind::Sync => Arc::new(SyncCommandBus::new(register)),
        CommandBusKind::Async(config) => Arc::new(AsyncCommandBus::new(register, config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documentation() {
        let config = CommandBusConfig::default();
        assert_eq!(usize::from(config.workers), 4);
        assert_eq!(usize::from(config.queue_capacity), 1024);
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(CommandBusKind::default(), CommandBusKind::Sync);
    }

    #[test]
    fn worker_count_bounds() {
        assert!(WorkerCount::try_new(0).is_err());
        assert!(WorkerCount::try_new(1).is_ok());
        assert!(WorkerCount::try_new(1024).is_ok());
        assert!(WorkerCount::try_new(1025).is_err());
    }

    #[test]
    fn queue_capacity_bounds() {
        assert!(QueueCapacity::try_new(0).is_err());
        assert!(QueueCapacity::try_new(1_000_000).is_ok());
        assert!(QueueCapacity::try_new(1_000_001).is_err());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let kind: CommandBusKind = serde_json::from_value(json!({
            "kind": "async",
            "workers": 30,
            "overflow": "reject"
        }))
        .unwrap();

        let CommandBusKind::Async(config) = kind else {
            panic!("expected the async variant, got {kind:?}");
        };
        assert_eq!(usize::from(config.workers), 30);
        assert_eq!(config.queue_capacity, QueueCapacity::default());
        assert_eq!(config.overflow, OverflowPolicy::Reject);
    }

    #[test]
    fn out_of_range_values_fail_to_deserialize() {
        let result = serde_json::from_value::<CommandBusConfig>(json!({ "workers": 0 }));
        assert!(result.is_err());
    }
}
