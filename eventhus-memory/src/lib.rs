//! In-memory backends for eventhus
//!
//! This crate provides an in-memory implementation of the `EventStore` and
//! `EventBus` ports from the eventhus crate, useful for testing and
//! development scenarios where persistence is not required.
//!
//! Clones share storage, so a test can keep a handle to the store or bus it
//! gave to a repository and inspect what was written.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use eventhus::errors::{EventBusError, EventStoreError, EventStoreResult};
use eventhus::event_store::{renumber_after, validate_batch, validate_batch_shape};
use eventhus::{AggregateId, Event, EventBus, EventStore, Version};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Thread-safe in-memory event store
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    // Each aggregate's history, ascending by version
    aggregates: Arc<RwLock<HashMap<AggregateId, Vec<Event>>>>,
}

impl InMemoryEventStore {
    /// Create a new empty in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all aggregates.
    pub fn event_count(&self) -> usize {
        self.aggregates.read().values().map(Vec::len).sum()
    }

    /// Every aggregate with at least one stored event.
    pub fn aggregate_ids(&self) -> Vec<AggregateId> {
        let mut ids: Vec<_> = self.aggregates.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

fn head_of(history: Option<&Vec<Event>>) -> Version {
    history
        .and_then(|events| events.last())
        .map_or_else(Version::initial, |event| event.version)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(&self, aggregate_id: &AggregateId) -> EventStoreResult<Vec<Event>> {
        let aggregates = self.aggregates.read();
        Ok(aggregates.get(aggregate_id).cloned().unwrap_or_default())
    }

    async fn save(&self, events: &[Event], expected: Version) -> EventStoreResult<()> {
        let aggregate_id = validate_batch(events, expected)?;

        // The check and the append happen under one write lock
        let mut aggregates = self.aggregates.write();
        let current = head_of(aggregates.get(&aggregate_id));
        if current != expected {
            return Err(EventStoreError::VersionConflict {
                aggregate_id,
                expected,
                current,
            });
        }

        aggregates
            .entry(aggregate_id)
            .or_default()
            .extend_from_slice(events);

        trace!(aggregate_id = %aggregate_id, count = events.len(), "events appended");
        Ok(())
    }

    async fn safe_save(&self, events: &[Event], _expected: Version) -> EventStoreResult<()> {
        let aggregate_id = validate_batch_shape(events)?;

        let mut aggregates = self.aggregates.write();
        let history = aggregates.entry(aggregate_id).or_default();
        let head = head_of(Some(history));
        history.extend(renumber_after(events, head));

        debug!(aggregate_id = %aggregate_id, count = events.len(), head = %head, "events appended without version check");
        Ok(())
    }

    async fn current_version(&self, aggregate_id: &AggregateId) -> EventStoreResult<Version> {
        Ok(head_of(self.aggregates.read().get(aggregate_id)))
    }
}

/// Default number of events a slow subscriber may lag behind.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// In-memory event bus backed by a tokio broadcast channel.
///
/// Every published event is also recorded, so tests can inspect publication
/// order without subscribing first. Publishing with no subscribers is not an
/// error.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<Event>,
    published: Arc<RwLock<Vec<Event>>>,
}

impl InMemoryEventBus {
    /// Create a bus with the default subscriber capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus whose subscribers may lag `capacity` events behind.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Every event published so far, in publication order.
    pub fn published(&self) -> Vec<Event> {
        self.published.read().clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &Event) -> Result<(), EventBusError> {
        self.published.write().push(event.clone());
        // Err only means nobody is subscribed
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        trace!(event_id = %event.id, receivers, "event published");
        Ok(())
    }
}
