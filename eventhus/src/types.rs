//! Core value types for the eventhus runtime.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle. Once a value exists it is
//! valid; nothing downstream re-checks it.

use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of an aggregate: a non-nil 128-bit UUID.
///
/// The canonical string form is the hyphenated lowercase UUID (see `Display`
/// and [`AggregateId::parse_str`]); the binary form is the 16 raw bytes used
/// by relational backends ([`AggregateId::to_bytes`], [`AggregateId::from_bytes`]).
#[nutype(
    validate(predicate = |id: &Uuid| !id.is_nil()),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AggregateId(Uuid);

/// Failure to turn external input into an [`AggregateId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAggregateIdError {
    /// The input is not a UUID in any accepted textual form.
    #[error("malformed aggregate id `{input}`: {reason}")]
    Malformed {
        /// The rejected input
        input: String,
        /// Why the UUID parser rejected it
        reason: String,
    },

    /// The nil UUID never identifies an aggregate.
    #[error("the nil uuid is not a valid aggregate id")]
    Nil,
}

impl AggregateId {
    /// Generates a fresh, time-ordered (UUIDv7) aggregate id.
    pub fn new() -> Self {
        // Uuid::now_v7() never returns the nil uuid
        Self::try_new(Uuid::now_v7()).expect("a v7 uuid is never nil")
    }

    /// Parses the canonical (or any other uuid-crate accepted) string form.
    pub fn parse_str(input: &str) -> Result<Self, ParseAggregateIdError> {
        let uuid = Uuid::parse_str(input.trim()).map_err(|error| ParseAggregateIdError::Malformed {
            input: input.to_string(),
            reason: error.to_string(),
        })?;
        Self::try_new(uuid).map_err(|_| ParseAggregateIdError::Nil)
    }

    /// Rebuilds an id from its 16-byte binary form.
    pub fn from_bytes(bytes: [u8; 16]) -> Result<Self, ParseAggregateIdError> {
        Self::try_new(Uuid::from_bytes(bytes)).map_err(|_| ParseAggregateIdError::Nil)
    }

    /// Returns the 16-byte binary form.
    pub fn to_bytes(self) -> [u8; 16] {
        self.into_inner().into_bytes()
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        self.as_ref()
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

/// A globally unique event identifier using UUIDv7 format.
///
/// `EventId` values are guaranteed to be UUIDv7, which provides time-based
/// ordering for events created in sequence.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        // This will always succeed as Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of an event within its aggregate's history.
///
/// Persisted events are numbered from 1. `0` is the "no prior version"
/// sentinel: the version of an aggregate with no history and the version a
/// creation command carries.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct Version(u64);

impl Version {
    /// The "no prior version" sentinel (0).
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Whether this is the "no prior version" sentinel.
    pub fn is_initial(self) -> bool {
        self.into_inner() == 0
    }

    /// Returns the next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }

    /// Returns the version `count` positions after this one.
    #[must_use]
    pub fn advanced_by(self, count: u64) -> Self {
        Self::new(self.into_inner() + count)
    }
}

/// Tag naming the kind of an aggregate (e.g. `"account"`).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AggregateType(String);

/// Tag naming the kind of an event payload (e.g. `"DepositPerformed"`).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventType(String);

/// Tag naming the kind of a command; the key of the command register.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CommandType(String);

/// A UTC instant with microsecond precision.
///
/// Sub-microsecond digits are dropped at construction so a timestamp survives
/// a round trip through its integer wire form unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp from a UTC `DateTime`, truncated to microseconds.
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(6))
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Rebuilds a timestamp from microseconds since the Unix epoch.
    pub fn from_micros(micros: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_micros(micros).map(Self)
    }

    /// Microseconds since the Unix epoch.
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
