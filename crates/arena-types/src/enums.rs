//! Enumeration types for the Arena evolution engine.
//!
//! Covers event categories, agent lifecycle status, capital dispositions,
//! ledger entry kinds, and the phases of the evolution cycle.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A type of event recorded in the event store.
///
/// The serialized form is the variant name (`"AgentSpawned"`, ...), which is
/// also the value written to the `event_type` column of the events table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    // --- Lifecycle ---
    /// A new agent was created with zero capital.
    AgentSpawned,
    /// An agent was terminated and its capital released.
    AgentKilled,
    /// An agent left the simulation tier for the proving tier.
    AgentGraduated,
    /// A child agent was derived from a parent by mutation.
    AgentMutated,

    // --- Capital ---
    /// Capital moved from the unallocated pool to an agent.
    CapitalAllocated,
    /// The conservation law was checked and the result recorded.
    CapitalConservationCheck,

    // --- Evaluation ---
    /// The external evaluator recorded one period of agent performance.
    PerformanceRecorded,

    // --- System ---
    /// An evolution cycle ran to completion.
    EvolutionCycleComplete,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::AgentSpawned,
        Self::AgentKilled,
        Self::AgentGraduated,
        Self::AgentMutated,
        Self::CapitalAllocated,
        Self::CapitalConservationCheck,
        Self::PerformanceRecorded,
        Self::EvolutionCycleComplete,
    ];

    /// The canonical string name of this event type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentSpawned => "AgentSpawned",
            Self::AgentKilled => "AgentKilled",
            Self::AgentGraduated => "AgentGraduated",
            Self::AgentMutated => "AgentMutated",
            Self::CapitalAllocated => "CapitalAllocated",
            Self::CapitalConservationCheck => "CapitalConservationCheck",
            Self::PerformanceRecorded => "PerformanceRecorded",
            Self::EvolutionCycleComplete => "EvolutionCycleComplete",
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl core::fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl core::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a simulation-tier agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum AgentStatus {
    /// Competing for capital in the simulation tier.
    Active,
    /// Terminated; capital returned to the pool.
    Killed,
    /// Promoted to the proving tier.
    Graduated,
}

impl AgentStatus {
    /// Whether the agent still participates in evolution cycles.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Why an agent was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum KillReason {
    /// Fitness below the kill threshold for longer than the negative streak limit.
    Underperformance,
    /// The capital curve fell further from its peak than the kill drawdown.
    Drawdown,
    /// Total return still negative at the configured age.
    NegativeReturn,
    /// Sharpe ratio below the floor at the configured age.
    LowSharpe,
    /// Age exceeded the configured retirement age.
    Retirement,
}

impl core::fmt::Display for KillReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Underperformance => write!(f, "underperformance"),
            Self::Drawdown => write!(f, "drawdown"),
            Self::NegativeReturn => write!(f, "negative_return"),
            Self::LowSharpe => write!(f, "low_sharpe"),
            Self::Retirement => write!(f, "retirement"),
        }
    }
}

/// What happens to a graduating agent's capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CapitalDisposition {
    /// Capital leaves the simulation-tier ledger (total shrinks by the amount).
    #[default]
    TransferredOut,
    /// Capital returns to the unallocated pool.
    Released,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Kind of movement recorded in the capital ledger.
///
/// | Type | From | To |
/// |------|------|----|
/// | Allocation | Pool | Agent |
/// | Release | Agent | Pool |
/// | `TransferOut` | Agent | Proving tier |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum LedgerEntryType {
    /// Unallocated capital assigned to an agent.
    Allocation,
    /// An agent's capital returned to the unallocated pool.
    Release,
    /// An agent's capital moved out of the simulation-tier ledger.
    TransferOut,
}

impl LedgerEntryType {
    /// The canonical string name used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Release => "release",
            Self::TransferOut => "transfer_out",
        }
    }
}

// ---------------------------------------------------------------------------
// Evolution cycle
// ---------------------------------------------------------------------------

/// Phase of the evolution-cycle state machine.
///
/// `Idle -> Allocate -> Kill -> Graduate -> Mutate -> Complete -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum CyclePhase {
    /// Between cycles.
    #[default]
    Idle,
    /// Distributing unallocated capital.
    Allocate,
    /// Removing underperformers.
    Kill,
    /// Promoting eligible agents.
    Graduate,
    /// Spawning mutated children of top performers.
    Mutate,
    /// All sub-steps finished; closing event appended.
    Complete,
}

impl CyclePhase {
    /// The phase that follows this one, or `None` for `Complete`.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Allocate),
            Self::Allocate => Some(Self::Kill),
            Self::Kill => Some(Self::Graduate),
            Self::Graduate => Some(Self::Mutate),
            Self::Mutate => Some(Self::Complete),
            Self::Complete => None,
        }
    }
}

impl core::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Allocate => "ALLOCATE",
            Self::Kill => "KILL",
            Self::Graduate => "GRADUATE",
            Self::Mutate => "MUTATE",
            Self::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_parses_its_own_name() {
        for et in EventType::ALL {
            assert_eq!(et.as_str().parse::<EventType>(), Ok(et));
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let parsed = "AllocationError".parse::<EventType>();
        assert_eq!(parsed, Err(UnknownEventType("AllocationError".to_owned())));
    }

    #[test]
    fn event_type_serde_matches_as_str() {
        let json = serde_json::to_string(&EventType::CapitalAllocated).unwrap_or_default();
        assert_eq!(json, "\"CapitalAllocated\"");
    }

    #[test]
    fn cycle_phases_run_in_order() {
        let mut phase = CyclePhase::Idle;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                CyclePhase::Idle,
                CyclePhase::Allocate,
                CyclePhase::Kill,
                CyclePhase::Graduate,
                CyclePhase::Mutate,
                CyclePhase::Complete,
            ]
        );
    }

    #[test]
    fn kill_reason_display_matches_serde() {
        for reason in [
            KillReason::Underperformance,
            KillReason::Drawdown,
            KillReason::NegativeReturn,
            KillReason::LowSharpe,
            KillReason::Retirement,
        ] {
            let json = serde_json::to_string(&reason).unwrap_or_default();
            assert_eq!(json, format!("\"{reason}\""));
        }
    }

    #[test]
    fn agent_status_serializes_lowercase() {
        let json = serde_json::to_string(&AgentStatus::Graduated).unwrap_or_default();
        assert_eq!(json, "\"graduated\"");
    }
}
