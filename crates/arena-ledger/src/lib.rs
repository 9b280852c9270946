//! Capital ledger for the simulation tier of the Arena.
//!
//! The ledger owns the arena capital pool and every agent's slice of it.
//! Capital is never created or destroyed inside the ledger: it moves between
//! the unallocated pool and agents, and leaves the ledger only through an
//! explicit transfer-out (graduation to the proving tier).
//!
//! # Modules
//!
//! - [`ledger`] -- The [`CapitalLedger`] struct: balances plus an append-only entry log.
//! - [`conservation`] -- Conservation law verification and anomaly detection.
//!
//! # Conservation Law
//!
//! At every observable point:
//!
//! ```text
//! total_capital == sum(allocations) + unallocated_capital
//! initial_capital == total_capital + transferred_out_capital
//! ```
//!
//! A violation produces a [`LedgerAnomaly`]. The ledger never panics; it
//! returns errors.
//!
//! # Entry types
//!
//! | Type | From | To |
//! |------|------|----|
//! | Allocation | Pool | Agent |
//! | Release | Agent | Pool |
//! | `TransferOut` | Agent | Proving tier |
//!
//! # Usage
//!
//! ```
//! use arena_ledger::{CapitalLedger, EntryStamp};
//! use arena_types::{AgentId, EventId};
//! use rust_decimal::Decimal;
//!
//! let mut ledger = CapitalLedger::new(Decimal::new(100_000, 0)).ok();
//! let agent = AgentId::new();
//! if let Some(ledger) = ledger.as_mut() {
//!     ledger
//!         .allocate(agent, Decimal::new(1_000, 0), EntryStamp::now(EventId::new()))
//!         .ok();
//!     assert!(ledger.verify_conservation().is_balanced());
//! }
//! ```

pub mod conservation;
pub mod ledger;

pub use conservation::{CONSERVATION_TOLERANCE, ConservationResult};
pub use ledger::{CapitalLedger, EntryStamp, floor_cents};

use arena_types::AgentId;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when moving capital through the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amounts must be strictly positive.
    #[error("ledger amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The invalid amount.
        amount: Decimal,
    },

    /// The initial pool must not be negative.
    #[error("initial capital must not be negative, got {amount}")]
    NegativeCapital {
        /// The invalid amount.
        amount: Decimal,
    },

    /// The unallocated pool cannot fund the requested amount.
    #[error("insufficient unallocated capital: requested {requested}, available {available}")]
    InsufficientCapital {
        /// Amount asked for.
        requested: Decimal,
        /// Amount left in the pool.
        available: Decimal,
    },

    /// Arithmetic overflowed the decimal range.
    #[error("arithmetic overflow while moving capital for agent {agent_id}")]
    Overflow {
        /// The agent whose movement overflowed.
        agent_id: AgentId,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation law violation.
///
/// Captures the balances that failed to reconcile so the caller can log or
/// record them. This is the ledger's most critical integrity alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// `total - (allocated + unallocated)`.
    pub discrepancy: Decimal,
    /// `initial - (total + transferred_out)`.
    pub leak: Decimal,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
