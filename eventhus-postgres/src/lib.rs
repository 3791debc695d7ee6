//! PostgreSQL event store for eventhus.
//!
//! All events live in one table, `eventhus_events`, keyed by event id and
//! carrying the aggregate's 16-byte binary id, its `aggregate_type`, the
//! 1-based version, the JSON payload and metadata, and a microsecond
//! timestamp. `UNIQUE (aggregate_id, version)` backs up the version check.
//!
//! Every append runs in one transaction that first takes a transaction-scoped
//! advisory lock on the aggregate, so the head read and the insert form one
//! atomic unit with respect to other writers of that aggregate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use eventhus::errors::{EventStoreError, EventStoreResult, Operation};
use eventhus::event_store::{renumber_after, validate_batch, validate_batch_shape};
use eventhus::{
    AggregateId, AggregateType, Event, EventId, EventMetadata, EventStore, EventType, Timestamp,
    Version,
};
use nutype::nutype;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{query, Pool, Postgres, Row, Transaction};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const VERSION_CONSTRAINT: &str = "eventhus_events_aggregate_version";

/// Errors raised while setting up the store.
#[derive(Debug, Error)]
pub enum PostgresEventStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    /// The schema migrations failed.
    #[error("failed to run postgres migrations")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by using `NonZeroU32` as the underlying type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Configuration for the `PostgresEventStore` connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 = match std::num::NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// Event store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Pool<Postgres>,
}

impl PostgresEventStore {
    /// Create a new `PostgresEventStore` with default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresEventStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Create a new `PostgresEventStore` with custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresEventStoreError> {
        let connection_string = connection_string.into();
        let max_connections: std::num::NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresEventStoreError::ConnectionFailed)?;
        info!(max_connections = %config.max_connections, "postgres event store connected");
        Ok(Self { pool })
    }

    /// Create a `PostgresEventStore` from an existing connection pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Checks that the database answers.
    pub async fn ping(&self) -> EventStoreResult<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::Connect))?;
        Ok(())
    }

    /// Creates or upgrades the schema.
    pub async fn migrate(&self) -> Result<(), PostgresEventStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresEventStoreError::MigrationFailed)?;
        info!("postgres event store schema is up to date");
        Ok(())
    }

    async fn begin_locked(
        &self,
        aggregate_id: AggregateId,
        operation: Operation,
    ) -> EventStoreResult<(Transaction<'static, Postgres>, Version)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(aggregate_id))
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;

        let head: i64 = query(
            "SELECT COALESCE(MAX(version), 0) AS head FROM eventhus_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.to_bytes().as_slice())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("head"))
        .map_err(|error| map_sqlx_error(error, operation))?;

        Ok((tx, version_from_column(head, aggregate_id)?))
    }

    async fn insert_all(
        tx: &mut Transaction<'static, Postgres>,
        events: &[Event],
        expected: Version,
        operation: Operation,
    ) -> EventStoreResult<()> {
        for event in events {
            query(
                "INSERT INTO eventhus_events
                    (event_id, aggregate_id, aggregate_type, version, event_type, event_data, metadata, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(*event.id.as_ref())
            .bind(event.aggregate_id.to_bytes().as_slice())
            .bind(event.aggregate_type.as_ref())
            .bind(version_to_column(event.version)?)
            .bind(event.event_type.as_ref())
            .bind(Json(&event.data))
            .bind(Json(&event.metadata))
            .bind(event.timestamp.as_micros())
            .execute(&mut **tx)
            .await
            .map_err(|error| {
                if is_version_violation(&error) {
                    // Some writer already holds this version
                    EventStoreError::VersionConflict {
                        aggregate_id: event.aggregate_id,
                        expected,
                        current: event.version,
                    }
                } else {
                    map_sqlx_error(error, operation)
                }
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(name = "postgres.load", skip(self), fields(aggregate_id = %aggregate_id))]
    async fn load(&self, aggregate_id: &AggregateId) -> EventStoreResult<Vec<Event>> {
        let rows = query(
            "SELECT event_id, aggregate_id, aggregate_type, version, event_type, event_data, metadata, recorded_at
             FROM eventhus_events WHERE aggregate_id = $1 ORDER BY version ASC",
        )
        .bind(aggregate_id.to_bytes().as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;

        let events = rows
            .iter()
            .map(|row| event_from_row(row, *aggregate_id))
            .collect::<EventStoreResult<Vec<_>>>()?;

        debug!(events = events.len(), "loaded aggregate history");
        Ok(events)
    }

    #[instrument(name = "postgres.save", skip(self, events), fields(count = events.len(), expected = %expected))]
    async fn save(&self, events: &[Event], expected: Version) -> EventStoreResult<()> {
        let aggregate_id = validate_batch(events, expected)?;

        let (mut tx, current) = self.begin_locked(aggregate_id, Operation::Save).await?;
        if current != expected {
            warn!(
                aggregate_id = %aggregate_id,
                expected = %expected,
                current = %current,
                "[postgres.version_conflict] optimistic concurrency check failed"
            );
            return Err(EventStoreError::VersionConflict {
                aggregate_id,
                expected,
                current,
            });
        }

        match Self::insert_all(&mut tx, events, expected, Operation::Save).await {
            Ok(()) => {}
            Err(EventStoreError::VersionConflict { .. }) => {
                // The unique constraint fired behind the lock; report the real head
                drop(tx);
                let current = self.current_version(&aggregate_id).await?;
                return Err(EventStoreError::VersionConflict {
                    aggregate_id,
                    expected,
                    current,
                });
            }
            Err(other) => return Err(other),
        }

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))?;
        Ok(())
    }

    #[instrument(name = "postgres.safe_save", skip(self, events), fields(count = events.len()))]
    async fn safe_save(&self, events: &[Event], _expected: Version) -> EventStoreResult<()> {
        let aggregate_id = validate_batch_shape(events)?;

        let (mut tx, head) = self.begin_locked(aggregate_id, Operation::SafeSave).await?;
        let renumbered = renumber_after(events, head);
        Self::insert_all(&mut tx, &renumbered, head, Operation::SafeSave).await?;

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))?;
        debug!(aggregate_id = %aggregate_id, head = %head, "appended events without version check");
        Ok(())
    }

    async fn current_version(&self, aggregate_id: &AggregateId) -> EventStoreResult<Version> {
        let head: i64 = query(
            "SELECT COALESCE(MAX(version), 0) AS head FROM eventhus_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.to_bytes().as_slice())
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get("head"))
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;

        version_from_column(head, *aggregate_id)
    }
}

/// Key for `pg_advisory_xact_lock`, folded from the aggregate id.
///
/// Distinct aggregates may share a key; that only serializes their writes.
fn advisory_lock_key(aggregate_id: AggregateId) -> i64 {
    let (high, low) = aggregate_id.as_uuid().as_u64_pair();
    i64::from_ne_bytes((high ^ low).to_ne_bytes())
}

fn version_to_column(version: Version) -> EventStoreResult<i64> {
    i64::try_from(version.into_inner())
        .map_err(|_| EventStoreError::SerializationFailed(format!("version {version} exceeds BIGINT")))
}

fn version_from_column(value: i64, aggregate_id: AggregateId) -> EventStoreResult<Version> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| EventStoreError::DeserializationFailed {
            aggregate_id,
            detail: format!("negative version {value}"),
        })
}

fn event_from_row(row: &PgRow, aggregate_id: AggregateId) -> EventStoreResult<Event> {
    let corrupt = |detail: String| EventStoreError::DeserializationFailed {
        aggregate_id,
        detail,
    };

    let event_id: Uuid = row
        .try_get("event_id")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let stored_id: Vec<u8> = row
        .try_get("aggregate_id")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let aggregate_type: String = row
        .try_get("aggregate_type")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let Json(data): Json<Value> = row
        .try_get("event_data")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;
    let Json(metadata): Json<EventMetadata> = row
        .try_get("metadata")
        .map_err(|error| corrupt(format!("metadata: {error}")))?;
    let recorded_at: i64 = row
        .try_get("recorded_at")
        .map_err(|error| map_sqlx_error(error, Operation::Load))?;

    let stored_id: [u8; 16] = stored_id
        .try_into()
        .map_err(|bytes: Vec<u8>| corrupt(format!("aggregate id has {} bytes", bytes.len())))?;

    Ok(Event {
        id: EventId::try_new(event_id).map_err(|error| corrupt(error.to_string()))?,
        aggregate_id: AggregateId::from_bytes(stored_id).map_err(|error| corrupt(error.to_string()))?,
        aggregate_type: AggregateType::try_new(aggregate_type)
            .map_err(|error| corrupt(error.to_string()))?,
        event_type: EventType::try_new(event_type).map_err(|error| corrupt(error.to_string()))?,
        version: version_from_column(version, aggregate_id)?,
        data,
        metadata,
        timestamp: Timestamp::from_micros(recorded_at)
            .ok_or_else(|| corrupt(format!("timestamp {recorded_at} out of range")))?,
    })
}

fn is_version_violation(error: &sqlx::Error) -> bool {
    // 23505: unique violation, here on (aggregate_id, version)
    matches!(
        error,
        sqlx::Error::Database(db_error)
            if db_error.code().as_deref() == Some("23505")
                && db_error.constraint() == Some(VERSION_CONSTRAINT)
    )
}

fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> EventStoreError {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) {
        warn!(error = %error, operation = %operation, "[postgres.unavailable] no connection available");
        return EventStoreError::Unavailable(error.to_string());
    }

    error!(
        error = %error,
        operation = %operation,
        "[postgres.database_error] database operation failed"
    );
    EventStoreError::StoreFailure {
        operation,
        detail: error.to_string(),
    }
}
