//! Error types for the arena-agents crate.

use arena_types::{AgentId, AgentStatus};

/// Errors that can occur during registry and policy operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Agent with the given ID was not found in the registry.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// An agent with this ID is already registered.
    #[error("duplicate agent id: {0}")]
    DuplicateAgent(AgentId),

    /// The operation requires an active agent.
    #[error("agent {agent_id} is {status:?}, not active")]
    NotActive {
        /// The agent.
        agent_id: AgentId,
        /// Its current status.
        status: AgentStatus,
    },

    /// No template exists for the strategy name.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A performance record was rejected.
    #[error("invalid performance record: {reason}")]
    InvalidPerformance {
        /// Why the record was rejected.
        reason: String,
    },

    /// The mutation range must be finite and within `[0, 1)`.
    #[error("invalid mutation range: {0}")]
    InvalidMutationRange(f64),

    /// An arithmetic overflow occurred.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },
}
