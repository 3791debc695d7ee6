//! Event store abstraction for eventhus.
//!
//! This module defines the `EventStore` trait that serves as the port
//! interface for the persistence backends. The trait is object safe so a
//! backend can be chosen at start-up and shared as `Arc<dyn EventStore>`.
//!
//! It also carries the batch rules every backend enforces, so the in-memory
//! and relational stores reject exactly the same malformed input.

use async_trait::async_trait;

use crate::errors::{EventStoreError, EventStoreResult};
use crate::event::Event;
use crate::types::{AggregateId, Version};

/// The port every persistence backend implements.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Loads an aggregate's full history in ascending version order.
    ///
    /// An aggregate without history yields an empty vector, not an error.
    /// Loading has no side effects and may be repeated freely.
    async fn load(&self, aggregate_id: &AggregateId) -> EventStoreResult<Vec<Event>>;

    /// Appends a batch atomically, guarded by the expected head version.
    ///
    /// The batch must satisfy [`validate_batch`]. The comparison of the
    /// persisted head with `expected` happens inside the same atomic unit as
    /// the append: either every event becomes visible to later loads or none
    /// does.
    ///
    /// # Errors
    /// * `EventStoreError::VersionConflict` - the head is not `expected`
    /// * `EventStoreError::InvalidBatch` - the batch breaks the batch rules
    async fn save(&self, events: &[Event], expected: Version) -> EventStoreResult<()>;

    /// Appends a batch without the version check.
    ///
    /// For administrative backfill only; ordinary command handling never uses
    /// it. The batch is renumbered to follow whatever head is stored at the
    /// time of the append (see [`renumber_after`]) so the history stays
    /// gap-free. `expected` is accepted for signature symmetry and ignored.
    async fn safe_save(&self, events: &[Event], expected: Version) -> EventStoreResult<()>;

    /// The aggregate's persisted head version, `Version::initial()` if it has
    /// no history.
    async fn current_version(&self, aggregate_id: &AggregateId) -> EventStoreResult<Version> {
        let events = self.load(aggregate_id).await?;
        Ok(events
            .last()
            .map_or_else(Version::initial, |event| event.version))
    }
}

/// Checks that a batch is non-empty and targets a single aggregate.
///
/// Returns the aggregate the batch belongs to.
pub fn validate_batch_shape(events: &[Event]) -> EventStoreResult<AggregateId> {
    let first = events
        .first()
        .ok_or_else(|| EventStoreError::InvalidBatch("batch is empty".to_string()))?;

    if let Some(stray) = events
        .iter()
        .find(|event| event.aggregate_id != first.aggregate_id)
    {
        return Err(EventStoreError::InvalidBatch(format!(
            "batch mixes aggregates {} and {}",
            first.aggregate_id, stray.aggregate_id
        )));
    }

    Ok(first.aggregate_id)
}

/// Checks the full batch rules for a guarded save.
///
/// Besides [`validate_batch_shape`], versions must run `expected + 1`,
/// `expected + 2`, ... without gaps.
pub fn validate_batch(events: &[Event], expected: Version) -> EventStoreResult<AggregateId> {
    let aggregate_id = validate_batch_shape(events)?;

    let mut want = expected;
    for event in events {
        want = want.next();
        if event.version != want {
            return Err(EventStoreError::InvalidBatch(format!(
                "event {} carries version {}, expected {}",
                event.id, event.version, want
            )));
        }
    }

    Ok(aggregate_id)
}

/// Copies a batch, renumbering it to follow `head`.
pub fn renumber_after(events: &[Event], head: Version) -> Vec<Event> {
    events
        .iter()
        .zip(1u64..)
        .map(|(event, offset)| Event {
            version: head.advanced_by(offset),
            ..event.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EventMetadata;
    use crate::types::{AggregateType, EventType};
    use serde_json::Value;

    fn event(aggregate_id: AggregateId, version: u64) -> Event {
        Event::new(
            aggregate_id,
            AggregateType::try_new("counter").unwrap(),
            EventType::try_new("Incremented").unwrap(),
            Version::new(version),
            Value::Null,
            EventMetadata::new(),
        )
    }

    #[test]
    fn consecutive_batch_is_accepted() {
        let id = AggregateId::new();
        let batch = vec![event(id, 3), event(id, 4), event(id, 5)];
        assert_eq!(validate_batch(&batch, Version::new(2)), Ok(id));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&[], Version::initial()),
            Err(EventStoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn mixed_aggregates_are_rejected() {
        let batch = vec![event(AggregateId::new(), 1), event(AggregateId::new(), 2)];
        assert!(matches!(
            validate_batch(&batch, Version::initial()),
            Err(EventStoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn gaps_and_wrong_starts_are_rejected() {
        let id = AggregateId::new();
        let gap = vec![event(id, 1), event(id, 3)];
        assert!(validate_batch(&gap, Version::initial()).is_err());

        let wrong_start = vec![event(id, 2)];
        assert!(validate_batch(&wrong_start, Version::initial()).is_err());
    }

    #[test]
    fn renumbering_follows_the_head() {
        let id = AggregateId::new();
        let batch = vec![event(id, 1), event(id, 1)];
        let renumbered = renumber_after(&batch, Version::new(7));

        let versions: Vec<u64> = renumbered.iter().map(|e| e.version.into()).collect();
        assert_eq!(versions, vec![8, 9]);
        assert_eq!(renumbered[0].id, batch[0].id);
    }
}
