//! In-memory event store.
//!
//! Events live in a single insertion-ordered vector. Secondary indices map
//! event ids, event types, and agent ids to positions in that vector so that
//! the common queries never scan the whole log.

use std::collections::{BTreeMap, HashMap};

use arena_types::{AgentId, Event, EventId, EventType, NewEvent};

use crate::{EventFilter, EventStore, EventStoreError};

/// Struct-of-vectors event store with type and agent indices.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventStore {
    /// All events, in insertion order.
    events: Vec<Event>,
    /// Event id -> position.
    by_id: HashMap<EventId, usize>,
    /// Event type -> positions (ascending).
    by_type: BTreeMap<EventType, Vec<usize>>,
    /// Agent id -> positions (ascending).
    by_agent: HashMap<AgentId, Vec<usize>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a previously stored log, keeping ids and order.
    ///
    /// # Errors
    ///
    /// Fails if the log violates causality or repeats an id.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Result<Self, EventStoreError> {
        let mut store = Self::new();
        for event in events {
            store.append(NewEvent::from(event))?;
        }
        Ok(store)
    }

    /// Sequence number of the most recent event, or 0 when empty.
    pub fn last_sequence(&self) -> u64 {
        self.events.last().map_or(0, |e| e.sequence)
    }

    /// Borrow every event in insertion order.
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Iterate over matching events without cloning.
    pub fn iter_matching<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> Box<dyn Iterator<Item = &'a Event> + 'a> {
        let positions: Option<&Vec<usize>> = match (filter.agent_id, filter.event_type) {
            (Some(agent), _) => Some(self.by_agent.get(&agent).unwrap_or(&EMPTY)),
            (None, Some(et)) => Some(self.by_type.get(&et).unwrap_or(&EMPTY)),
            (None, None) => None,
        };

        match positions {
            Some(positions) => Box::new(
                positions
                    .iter()
                    .filter_map(|&pos| self.events.get(pos))
                    .filter(move |e| filter.matches(e)),
            ),
            None => Box::new(self.events.iter().filter(move |e| filter.matches(e))),
        }
    }
}

/// Shared empty index used for unknown agents and types.
static EMPTY: Vec<usize> = Vec::new();

impl EventStore for MemoryEventStore {
    fn append(&mut self, event: NewEvent) -> Result<Event, EventStoreError> {
        if let Some(cause) = event.caused_by
            && !self.by_id.contains_key(&cause)
        {
            return Err(EventStoreError::UnknownCause { caused_by: cause });
        }
        if let Some(id) = event.event_id
            && self.by_id.contains_key(&id)
        {
            return Err(EventStoreError::DuplicateEventId(id));
        }

        let sequence = self.last_sequence().saturating_add(1);
        let stored = event.into_event(sequence);
        let pos = self.events.len();

        self.by_id.insert(stored.event_id, pos);
        self.by_type.entry(stored.event_type).or_default().push(pos);
        if let Some(agent) = stored.agent_id {
            self.by_agent.entry(agent).or_default().push(pos);
        }
        self.events.push(stored.clone());

        tracing::trace!(
            sequence,
            event_type = %stored.event_type,
            event_id = %stored.event_id,
            "Event appended"
        );
        Ok(stored)
    }

    fn get(&self, id: EventId) -> Option<Event> {
        self.by_id
            .get(&id)
            .and_then(|&pos| self.events.get(pos))
            .cloned()
    }

    fn contains(&self, id: EventId) -> bool {
        self.by_id.contains_key(&id)
    }

    fn query(&self, filter: &EventFilter) -> Vec<Event> {
        self.iter_matching(filter).cloned().collect()
    }

    fn len(&self) -> usize {
        self.events.len()
    }
}
