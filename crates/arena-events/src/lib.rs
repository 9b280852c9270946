//! Event sourcing for the Arena evolution engine.
//!
//! Every state change in the arena produces an immutable event appended to an
//! [`EventStore`]. Events are the source of truth: the capital ledger and the
//! population registry can be rebuilt by folding the stored events, in order,
//! through the same reducer the live arena uses.
//!
//! # Invariants
//!
//! - **Append-only**: stored events are never modified or removed.
//! - **Ordered**: `sequence` strictly increases in insertion order, and every
//!   query returns events in that order.
//! - **Causal**: `caused_by` always names an event already in the store.
//!
//! # Modules
//!
//! - [`filter`] -- [`EventFilter`] for queries by type, agent, and cycle
//! - [`memory`] -- [`MemoryEventStore`], the struct-of-vectors store

pub mod filter;
pub mod memory;

pub use filter::EventFilter;
pub use memory::MemoryEventStore;

use arena_types::{AgentId, Event, EventId, NewEvent};

/// Errors that can occur when appending to an event store.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// `caused_by` names an event that is not in the store.
    #[error("caused_by references unknown event {caused_by}")]
    UnknownCause {
        /// The missing event.
        caused_by: EventId,
    },

    /// An event with this id has already been stored.
    #[error("duplicate event id {0}")]
    DuplicateEventId(EventId),

    /// The storage backend refused the write.
    #[error("event store backend error: {0}")]
    Backend(String),
}

/// A durable, queryable, append-only event log.
///
/// Implementations must keep the invariants listed in the crate docs. The
/// in-memory store is the live log of an arena; durable backends receive the
/// same events and can hand them back for replay.
pub trait EventStore: Send + Sync {
    /// Append an event, assigning its id, timestamp, and sequence.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::UnknownCause`] if `caused_by` is not in the
    /// store, or [`EventStoreError::DuplicateEventId`] if a pre-assigned id
    /// is already taken. Nothing is stored on error.
    fn append(&mut self, event: NewEvent) -> Result<Event, EventStoreError>;

    /// Look up a single event by id.
    fn get(&self, id: EventId) -> Option<Event>;

    /// Whether an event with this id exists.
    fn contains(&self, id: EventId) -> bool {
        self.get(id).is_some()
    }

    /// Return the matching events in insertion order.
    ///
    /// The result is a finite snapshot; calling again restarts from the
    /// beginning and includes anything appended since.
    fn query(&self, filter: &EventFilter) -> Vec<Event>;

    /// Number of stored events.
    fn len(&self) -> usize;

    /// Whether the store holds no events.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every event, or only those about `agent_id`, in append order.
    fn replay(&self, agent_id: Option<AgentId>) -> Vec<Event> {
        let filter = agent_id.map_or_else(EventFilter::all, |id| EventFilter::all().agent(id));
        self.query(&filter)
    }

    /// Walk `caused_by` links from `id` back to the root cause.
    ///
    /// The first element is the event itself; the last has no cause.
    fn causal_chain(&self, id: EventId) -> Vec<Event> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id);
        while let Some(event) = cursor {
            cursor = event.caused_by.and_then(|cause| self.get(cause));
            chain.push(event);
        }
        chain
    }
}
