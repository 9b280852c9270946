//! Shared type definitions for the Arena evolution engine.
//!
//! This crate is the single source of truth for the types exchanged between
//! the event store, the capital ledger, the population registry, and the
//! arena manager. Types are exported to `TypeScript` via `ts-rs` so that
//! dashboard collaborators can read breakdowns and events verbatim.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for agents, events, and ledger entries
//! - [`enums`] -- Event types, agent status, ledger entry kinds, cycle phases
//! - [`structs`] -- Event envelope, agent record, payloads, ledger entry, breakdown

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AgentStatus, CapitalDisposition, CyclePhase, EventType, KillReason, LedgerEntryType,
    UnknownEventType,
};
pub use ids::{AgentId, EventId, LedgerEntryId};
pub use structs::{
    Agent, AgentGraduatedDetails, AgentKilledDetails, AgentMutatedDetails, AgentSpawnedDetails,
    CapitalAllocatedDetails, CapitalBreakdown, CapitalConservationCheckDetails, CapitalSnapshot,
    Event, EvolutionCycleCompleteDetails, LedgerEntry, NewEvent, ParamDelta, Params,
    PerformanceRecordedDetails, PerformanceSnapshot,
};
