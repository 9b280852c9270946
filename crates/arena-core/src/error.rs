//! Error types for the arena manager.

use rust_decimal::Decimal;

use arena_agents::AgentError;
use arena_events::EventStoreError;
use arena_ledger::{LedgerAnomaly, LedgerError};
use arena_types::{CyclePhase, EventId, EventType};

use crate::config::ConfigError;

/// Why an event was refused before it reached the log.
///
/// Nothing is appended when validation fails.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The payload does not match the event type.
    #[error("malformed {event_type} payload: {source}")]
    Payload {
        /// The event type being validated.
        event_type: EventType,
        /// The decode failure.
        source: serde_json::Error,
    },

    /// The event type requires an agent id.
    #[error("{0} event requires an agent id")]
    MissingAgent(EventType),

    /// The registry refused the change.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// The ledger refused the change.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A policy rule or payload consistency check failed.
    #[error("policy violation: {0}")]
    Policy(String),

    /// The event belongs to a different cycle than the arena is in.
    #[error("event for cycle {found} while arena is in cycle {expected}")]
    CycleMismatch {
        /// The arena's current cycle.
        expected: u64,
        /// The cycle named by the event.
        found: u64,
    },

    /// `caused_by` or `event_id` conflicts with the log.
    #[error(transparent)]
    Causality(EventStoreError),
}

/// Errors raised by [`Arena`](crate::Arena) operations.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The operation was rejected before anything was appended.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A top-up exceeded the pool while clamping is disabled.
    #[error("allocation of {requested} exceeds available capital {available}")]
    Allocation {
        /// The amount asked for.
        requested: Decimal,
        /// What the pool held.
        available: Decimal,
    },

    /// The ledger no longer reconciles.
    #[error("capital conservation violated: {anomaly}")]
    CapitalConservation {
        /// The balances that failed to reconcile.
        anomaly: LedgerAnomaly,
    },

    /// The event store backend failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),

    /// A stored event could not be applied to the state.
    #[error("event {event_id} could not be applied: {source}")]
    Integrity {
        /// The offending event.
        event_id: EventId,
        /// Why it failed.
        source: ValidationError,
    },

    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A payload could not be encoded.
    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<EventStoreError> for ArenaError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::UnknownCause { .. } | EventStoreError::DuplicateEventId(_) => {
                Self::Validation(ValidationError::Causality(err))
            }
            EventStoreError::Backend(_) => Self::Store(err),
        }
    }
}

impl From<AgentError> for ArenaError {
    fn from(err: AgentError) -> Self {
        Self::Validation(ValidationError::Agent(err))
    }
}

/// Errors that end an evolution cycle early.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// A stop was requested before `before` started.
    #[error("cycle cancelled before {before}")]
    Cancelled {
        /// The phase that did not run.
        before: CyclePhase,
    },

    /// A phase failed.
    #[error("cycle phase {phase} failed: {source}")]
    Step {
        /// The phase that failed.
        phase: CyclePhase,
        /// The underlying error.
        source: ArenaError,
    },
}

impl CycleError {
    /// The phase that failed or was skipped.
    pub const fn phase(&self) -> CyclePhase {
        match self {
            Self::Cancelled { before } => *before,
            Self::Step { phase, .. } => *phase,
        }
    }
}
