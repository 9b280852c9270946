//! Core entity structs for the Arena evolution engine.
//!
//! Covers the event envelope, the simulation-tier agent record, the typed
//! payloads carried in [`Event::data`], capital ledger entries, and the
//! read-only capital breakdown handed to external collaborators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AgentStatus, CapitalDisposition, EventType, KillReason, LedgerEntryType};
use crate::ids::{AgentId, EventId, LedgerEntryId};

/// Named strategy parameters (numbers, strings, lists).
pub type Params = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An immutable, stored domain event.
///
/// Events are produced only by the event store's `append`, which assigns the
/// `sequence` number. Once stored, an event is never modified or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique event identifier.
    pub event_id: EventId,
    /// Position in the store, strictly increasing in insertion order.
    pub sequence: u64,
    /// The category of event.
    pub event_type: EventType,
    /// The agent the event is about, if any (`None` for system events).
    pub agent_id: Option<AgentId>,
    /// Evolution cycle index during which the event was produced.
    pub cycle: u64,
    /// Real-world timestamp.
    pub timestamp: DateTime<Utc>,
    /// Type-specific payload.
    pub data: serde_json::Value,
    /// The earlier event that triggered this one.
    pub caused_by: Option<EventId>,
}

impl Event {
    /// Deserialize the payload into its typed details struct.
    pub fn details<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// An event that has not been appended yet.
///
/// `event_id` and `timestamp` are filled in by the store when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Pre-assigned identifier (e.g. when importing a stored log).
    pub event_id: Option<EventId>,
    /// The category of event.
    pub event_type: EventType,
    /// The agent the event is about, if any.
    pub agent_id: Option<AgentId>,
    /// Evolution cycle index.
    pub cycle: u64,
    /// Pre-assigned timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Type-specific payload.
    pub data: serde_json::Value,
    /// The earlier event that triggered this one.
    pub caused_by: Option<EventId>,
}

impl NewEvent {
    /// Build a new event from a typed details payload.
    pub fn new<T: Serialize>(
        event_type: EventType,
        agent_id: Option<AgentId>,
        cycle: u64,
        details: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: None,
            event_type,
            agent_id,
            cycle,
            timestamp: None,
            data: serde_json::to_value(details)?,
            caused_by: None,
        })
    }

    /// Link this event to the event that caused it.
    #[must_use]
    pub const fn caused_by(mut self, cause: Option<EventId>) -> Self {
        self.caused_by = cause;
        self
    }

    /// Fill in the id and timestamp and assign the store sequence.
    pub fn into_event(self, sequence: u64) -> Event {
        Event {
            event_id: self.event_id.unwrap_or_default(),
            sequence,
            event_type: self.event_type,
            agent_id: self.agent_id,
            cycle: self.cycle,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            data: self.data,
            caused_by: self.caused_by,
        }
    }
}

impl From<Event> for NewEvent {
    fn from(event: Event) -> Self {
        Self {
            event_id: Some(event.event_id),
            event_type: event.event_type,
            agent_id: event.agent_id,
            cycle: event.cycle,
            timestamp: Some(event.timestamp),
            data: event.data,
            caused_by: event.caused_by,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// One evaluation period of agent performance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PerformanceSnapshot {
    /// Profit or loss for the period.
    pub pnl: f64,
    /// Simulated capital at the end of the period.
    pub capital: f64,
}

impl PerformanceSnapshot {
    /// Period return (`pnl / capital`), zero when capital is not positive.
    pub fn period_return(&self) -> f64 {
        if self.capital > 0.0 {
            self.pnl / self.capital
        } else {
            0.0
        }
    }
}

/// A simulation-tier agent competing for arena capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Agent {
    /// Unique agent identifier.
    pub id: AgentId,
    /// Name of the strategy template the agent runs.
    pub strategy_name: String,
    /// Strategy parameters (template defaults merged with overrides).
    pub params: Params,
    /// Latest fitness score reported for the agent.
    pub fitness_score: f64,
    /// Number of evaluation periods survived.
    pub age: u32,
    /// Consecutive periods with negative P&L.
    pub days_negative: u32,
    /// Append-only performance record.
    pub performance_history: Vec<PerformanceSnapshot>,
    /// Capital currently held from the arena pool.
    #[ts(as = "String")]
    pub capital_allocated: Decimal,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Parent agent when spawned by mutation.
    pub parent_id: Option<AgentId>,
    /// Mutation depth (0 for freshly spawned agents).
    pub generation: u32,
    /// The `AgentSpawned` event that created this agent.
    pub spawn_event_id: EventId,
    /// Position in spawn order, used to break fitness ties.
    pub spawn_order: u64,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Payload of [`EventType::AgentSpawned`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentSpawnedDetails {
    /// Strategy template name.
    pub strategy_name: String,
    /// Resolved strategy parameters.
    pub params: Params,
    /// Parent agent for mutated children.
    pub parent_id: Option<AgentId>,
    /// Mutation depth.
    pub generation: u32,
}

/// Payload of [`EventType::AgentKilled`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentKilledDetails {
    /// Why the agent was killed.
    pub reason: KillReason,
    /// Fitness at the time of death.
    pub final_fitness: f64,
    /// Capital returned to the unallocated pool.
    #[ts(as = "String")]
    pub final_capital: Decimal,
}

/// Payload of [`EventType::CapitalAllocated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapitalAllocatedDetails {
    /// Amount actually moved from the pool to the agent.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Amount the allocation policy asked for.
    #[ts(as = "String")]
    pub requested: Decimal,
    /// Whether `amount` was clamped to the available pool.
    pub clamped: bool,
    /// Total allocated across all agents after this allocation.
    #[ts(as = "String")]
    pub total_allocated: Decimal,
    /// Capital managed by the simulation tier.
    #[ts(as = "String")]
    pub arena_capital: Decimal,
}

/// Payload of [`EventType::AgentGraduated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentGraduatedDetails {
    /// Fitness at graduation.
    pub fitness_score: f64,
    /// Age at graduation.
    pub age: u32,
    /// Copy of the agent's performance history.
    pub performance_history_snapshot: Vec<PerformanceSnapshot>,
    /// Capital the agent held when it left the simulation tier.
    #[ts(as = "String")]
    pub capital: Decimal,
    /// How that capital was accounted for.
    pub disposition: CapitalDisposition,
}

/// Before/after values of one mutated parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParamDelta {
    /// Parent value.
    pub before: serde_json::Value,
    /// Child value.
    pub after: serde_json::Value,
}

/// Payload of [`EventType::AgentMutated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentMutatedDetails {
    /// The new child agent.
    pub child_id: AgentId,
    /// The agent it was derived from.
    pub parent_id: AgentId,
    /// Parameters that changed, keyed by name.
    pub mutation_delta: BTreeMap<String, ParamDelta>,
}

/// Payload of [`EventType::PerformanceRecorded`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PerformanceRecordedDetails {
    /// Profit or loss for the period.
    pub pnl: f64,
    /// Simulated capital at the end of the period.
    pub capital: f64,
    /// Fitness after the period.
    pub fitness_score: f64,
}

/// Capital totals at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapitalSnapshot {
    /// Capital currently managed by the simulation-tier ledger.
    #[ts(as = "String")]
    pub total_capital: Decimal,
    /// Sum of active agents' allocations.
    #[ts(as = "String")]
    pub allocated_capital: Decimal,
    /// Capital in the pool.
    #[ts(as = "String")]
    pub unallocated_capital: Decimal,
    /// Capital moved out to the proving tier so far.
    #[ts(as = "String")]
    pub transferred_out_capital: Decimal,
}

/// Payload of [`EventType::CapitalConservationCheck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapitalConservationCheckDetails {
    /// Ledger totals at the time of the check.
    pub snapshot: CapitalSnapshot,
    /// Whether the check passed.
    pub conserved: bool,
    /// `total - (allocated + unallocated)`.
    #[ts(as = "String")]
    pub discrepancy: Decimal,
}

/// Payload of [`EventType::EvolutionCycleComplete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EvolutionCycleCompleteDetails {
    /// Index of the cycle that completed.
    pub cycle_number: u64,
    /// Agents killed during the cycle.
    pub agents_killed: u32,
    /// Agents graduated during the cycle.
    pub agents_graduated: u32,
    /// Children spawned by mutation during the cycle.
    pub agents_mutated: u32,
    /// Ledger totals at the end of the cycle.
    pub capital_snapshot: CapitalSnapshot,
    /// Every event appended during the cycle, in order.
    pub sub_events: Vec<EventId>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A single capital movement in the simulation-tier ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerEntry {
    /// Unique entry identifier.
    pub id: LedgerEntryId,
    /// Position in the ledger.
    pub sequence: u64,
    /// The kind of movement.
    pub entry_type: LedgerEntryType,
    /// The agent on the non-pool side of the movement.
    pub agent_id: AgentId,
    /// Amount moved (always positive).
    #[ts(as = "String")]
    pub amount: Decimal,
    /// The event whose application produced this entry.
    pub event_id: Option<EventId>,
    /// Real-world timestamp.
    pub created_at: DateTime<Utc>,
}

/// Read-only view of the simulation-tier capital ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapitalBreakdown {
    /// Capital currently managed by the simulation-tier ledger.
    #[ts(as = "String")]
    pub total_capital: Decimal,
    /// Sum of active agents' allocations.
    #[ts(as = "String")]
    pub allocated_capital: Decimal,
    /// Capital in the pool.
    #[ts(as = "String")]
    pub unallocated_capital: Decimal,
    /// Capital moved out to the proving tier so far.
    #[ts(as = "String")]
    pub transferred_out_capital: Decimal,
    /// `allocated / total`, between 0 and 1.
    pub utilization: f64,
    /// Per-agent allocations.
    #[ts(as = "BTreeMap<AgentId, String>")]
    pub allocations: BTreeMap<AgentId, Decimal>,
}
