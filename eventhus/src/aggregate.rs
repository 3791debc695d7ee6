//! The aggregate model.
//!
//! An aggregate is a consistency boundary whose state is derived solely from
//! its own ordered history. Concrete aggregates implement [`Aggregate`] for
//! replay and one [`HandleCommand`] per command they accept. The runtime
//! wraps them in an [`AggregateRoot`] that tracks identity and version.

use crate::errors::{CommandResult, RegistryError};
use crate::event::DomainEvent;
use crate::types::{AggregateId, AggregateType, Version};

/// State rebuilt from an event history.
///
/// `Default` is the empty shape, the state before the first event.
pub trait Aggregate: Default + Send + Sync + 'static {
    /// Tag stored with every event of this aggregate.
    const AGGREGATE_TYPE: &'static str;

    /// The payload type of this aggregate's events.
    type Event: DomainEvent;

    /// Folds one event into the state.
    ///
    /// Must be deterministic and infallible: history is fact, so an event
    /// that has been stored is always applicable.
    fn apply(&mut self, event: &Self::Event);

    /// The validated form of [`Aggregate::AGGREGATE_TYPE`].
    fn aggregate_type() -> Result<AggregateType, RegistryError> {
        AggregateType::try_new(Self::AGGREGATE_TYPE).map_err(|error| {
            RegistryError::InvalidTypeName {
                name: Self::AGGREGATE_TYPE.to_string(),
                detail: error.to_string(),
            }
        })
    }
}

/// Decision logic for one command type.
///
/// Pure: looks at the current state and the command and either rejects it or
/// returns the events that record its effect. Returning no events is allowed
/// and commits nothing.
pub trait HandleCommand<C>: Aggregate {
    /// Decides the command against the current state.
    fn handle(&self, command: &C) -> CommandResult<Vec<Self::Event>>;
}

/// An aggregate together with its identity and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRoot<A> {
    id: AggregateId,
    version: Version,
    state: A,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// An aggregate with no history.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: Version::initial(),
            state: A::default(),
        }
    }

    /// Replays payloads in order, numbering them from 1.
    pub fn from_history<'a>(
        id: AggregateId,
        history: impl IntoIterator<Item = &'a A::Event>,
    ) -> Self {
        let mut root = Self::new(id);
        for event in history {
            root.apply(event);
        }
        root
    }

    /// The aggregate's identity.
    pub const fn id(&self) -> AggregateId {
        self.id
    }

    /// Version of the last applied event.
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Whether any event has been applied.
    pub fn exists(&self) -> bool {
        !self.version.is_initial()
    }

    /// The current state.
    pub const fn state(&self) -> &A {
        &self.state
    }

    /// Consumes the root, returning the state.
    pub fn into_state(self) -> A {
        self.state
    }

    fn apply(&mut self, event: &A::Event) {
        self.apply_recorded(event, self.version.next());
    }

    /// Applies a stored event, adopting its version.
    pub(crate) fn apply_recorded(&mut self, event: &A::Event, version: Version) {
        self.state.apply(event);
        self.version = version;
    }
}
