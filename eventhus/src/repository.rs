//! The aggregate repository.
//!
//! Loads aggregates by replaying their history through the event register
//! and saves the events a command produced under the optimistic-concurrency
//! check of the event store. After a successful save the new events are
//! published on the event bus, one by one, in version order.
//!
//! The repository holds no per-aggregate state between calls, so any number
//! of handlers may share one instance. Concurrent saves of the same aggregate
//! meet only at the store's atomic version check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::errors::{CommandError, CommandResult, EventStoreError};
use crate::event::Event;
use crate::event_bus::EventBus;
use crate::event_register::EventRegister;
use crate::event_store::EventStore;
use crate::metadata::EventMetadata;
use crate::types::AggregateId;

/// Loads and saves aggregates through the store and bus ports.
pub struct Repository {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    events: Arc<EventRegister>,
    publish_failures: AtomicU64,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("events", &self.events)
            .field("publish_failures", &self.publish_failures)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Creates a repository over the given ports.
    pub fn new(
        store: Arc<dyn EventStore>,
        bus: Arc<dyn EventBus>,
        events: Arc<EventRegister>,
    ) -> Self {
        Self {
            store,
            bus,
            events,
            publish_failures: AtomicU64::new(0),
        }
    }

    /// The event store behind this repository.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The event register used to decode histories.
    pub fn event_register(&self) -> &EventRegister {
        &self.events
    }

    /// Number of events that were committed but could not be published.
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Loads and replays an aggregate.
    ///
    /// # Errors
    /// * `CommandError::NotFound` - the aggregate has no history
    /// * `CommandError::Registry` - a stored event could not be decoded
    /// * `CommandError::EventStore` - the stored history does not run 1, 2, ..., n
    pub async fn load<A: Aggregate>(&self, aggregate_id: AggregateId) -> CommandResult<AggregateRoot<A>> {
        let root = self.load_or_new(aggregate_id).await?;
        if root.exists() {
            Ok(root)
        } else {
            Err(CommandError::NotFound(aggregate_id))
        }
    }

    /// Loads and replays an aggregate, yielding an empty one when it has no
    /// history.
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load_or_new<A: Aggregate>(
        &self,
        aggregate_id: AggregateId,
    ) -> CommandResult<AggregateRoot<A>> {
        let history = self.store.load(&aggregate_id).await?;

        let mut root = AggregateRoot::new(aggregate_id);
        for event in &history {
            let expected = root.version().next();
            if event.version != expected {
                return Err(EventStoreError::DeserializationFailed {
                    aggregate_id,
                    detail: format!(
                        "history out of sequence: found version {} where {expected} was expected",
                        event.version
                    ),
                }
                .into());
            }
            let payload: A::Event = self.events.decode(event)?;
            root.apply_recorded(&payload, event.version);
        }

        debug!(events = history.len(), version = %root.version(), "aggregate loaded");
        Ok(root)
    }

    /// Saves the events a command produced and advances the aggregate.
    ///
    /// Versions are assigned from `root.version() + 1`; the store checks
    /// `root.version()` as the expected head. On success the events are
    /// applied to `root` and published in order, and the stored envelopes are
    /// returned. Saving no events is a no-op.
    ///
    /// A conflict is returned as-is: retrying requires re-deciding the
    /// command against fresh state, which is the caller's call.
    ///
    /// # Errors
    /// * `CommandError::ConcurrencyConflict` - another writer got there first
    /// * `CommandError::EventStore` - the store failed; nothing was committed
    #[instrument(
        skip(self, root, new_events, metadata),
        fields(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %root.id(),
            expected = %root.version(),
            count = new_events.len()
        )
    )]
    pub async fn save<A: Aggregate>(
        &self,
        root: &mut AggregateRoot<A>,
        new_events: Vec<A::Event>,
        metadata: &EventMetadata,
    ) -> CommandResult<Vec<Event>> {
        if new_events.is_empty() {
            return Ok(Vec::new());
        }

        let aggregate_type = A::aggregate_type()?;
        let expected = root.version();

        let mut envelopes = Vec::with_capacity(new_events.len());
        let mut version = expected;
        for payload in &new_events {
            version = version.next();
            envelopes.push(Event::from_payload(
                root.id(),
                aggregate_type.clone(),
                version,
                payload,
                metadata.clone(),
            )?);
        }

        self.store.save(&envelopes, expected).await?;

        for (payload, envelope) in new_events.iter().zip(&envelopes) {
            root.apply_recorded(payload, envelope.version);
        }
        debug!(version = %root.version(), "events committed");

        for envelope in &envelopes {
            if let Err(error) = self.bus.publish(envelope).await {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    version = %envelope.version,
                    error = %error,
                    "failed to publish committed event"
                );
            }
        }

        Ok(envelopes)
    }
}
