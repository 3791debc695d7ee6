//! Event bus port.
//!
//! The repository publishes every event after the store has durably accepted
//! it. Publication is best-effort signalling, outside the consistency
//! boundary: a failed publish never undoes a commit.

use async_trait::async_trait;

use crate::errors::EventBusError;
use crate::event::Event;

/// The port every notification backend implements.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one committed event.
    async fn publish(&self, event: &Event) -> Result<(), EventBusError>;
}
