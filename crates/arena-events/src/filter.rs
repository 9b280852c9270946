//! Query filters for the event store.

use arena_types::{AgentId, Event, EventType};

/// Selects events by type, agent, cycle, and sequence position.
///
/// Every criterion is optional; an empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events of this type.
    pub event_type: Option<EventType>,
    /// Only events about this agent.
    pub agent_id: Option<AgentId>,
    /// Only events produced during this cycle.
    pub cycle: Option<u64>,
    /// Only events with a sequence strictly greater than this.
    pub after_sequence: Option<u64>,
}

impl EventFilter {
    /// A filter that matches every event.
    pub const fn all() -> Self {
        Self {
            event_type: None,
            agent_id: None,
            cycle: None,
            after_sequence: None,
        }
    }

    /// Restrict to one event type.
    #[must_use]
    pub const fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Restrict to one agent.
    #[must_use]
    pub const fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Restrict to one cycle.
    #[must_use]
    pub const fn cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }

    /// Restrict to events stored after `sequence`.
    #[must_use]
    pub const fn after(mut self, sequence: u64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    /// Whether `event` satisfies every criterion.
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.is_none_or(|et| event.event_type == et)
            && self.agent_id.is_none_or(|id| event.agent_id == Some(id))
            && self.cycle.is_none_or(|c| event.cycle == c)
            && self.after_sequence.is_none_or(|s| event.sequence > s)
    }
}
