//! Conservation law verification for the capital ledger.
//!
//! Three checks, in order:
//!
//! 1. **Pool balance**: `total - (sum(allocations) + unallocated)` is below
//!    [`CONSERVATION_TOLERANCE`].
//! 2. **No leak**: `initial - (total + transferred_out)` is within tolerance.
//! 3. **Entry audit**: folding the entry log from the initial capital
//!    reproduces the live balances exactly, and no balance is negative.
//!
//! Every movement keeps the first two by construction. The third catches a
//! balance that was changed without a matching entry.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use arena_types::{AgentId, CapitalSnapshot, LedgerEntry, LedgerEntryType};

use crate::LedgerAnomaly;

/// Absolute discrepancy at which the ledger no longer counts as conserved (one cent).
pub const CONSERVATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// The result of a conservation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// The ledger balances.
    Balanced {
        /// `total - (allocated + unallocated)`, within tolerance.
        discrepancy: Decimal,
    },
    /// The ledger does not balance.
    Anomaly(LedgerAnomaly),
}

impl ConservationResult {
    /// Whether the check passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced { .. })
    }

    /// The pool discrepancy found by the check.
    pub const fn discrepancy(&self) -> Decimal {
        match self {
            Self::Balanced { discrepancy } => *discrepancy,
            Self::Anomaly(anomaly) => anomaly.discrepancy,
        }
    }

    /// `(ok, discrepancy)`.
    pub const fn as_pair(&self) -> (bool, Decimal) {
        (self.is_balanced(), self.discrepancy())
    }
}

/// Verify the conservation law for a ledger's balances and entry log.
pub fn verify_conservation(
    initial_capital: Decimal,
    snapshot: &CapitalSnapshot,
    allocations: &BTreeMap<AgentId, Decimal>,
    entries: &[LedgerEntry],
) -> ConservationResult {
    let Some(accounted) = snapshot
        .allocated_capital
        .checked_add(snapshot.unallocated_capital)
    else {
        return overflow_anomaly();
    };
    let Some(accounted_in_out) = snapshot
        .total_capital
        .checked_add(snapshot.transferred_out_capital)
    else {
        return overflow_anomaly();
    };

    let Some(discrepancy) = snapshot.total_capital.checked_sub(accounted) else {
        return overflow_anomaly();
    };
    let Some(leak) = initial_capital.checked_sub(accounted_in_out) else {
        return overflow_anomaly();
    };

    if discrepancy.abs() >= CONSERVATION_TOLERANCE || leak.abs() >= CONSERVATION_TOLERANCE {
        return ConservationResult::Anomaly(LedgerAnomaly {
            discrepancy,
            leak,
            message: format!(
                "CAPITAL_ANOMALY: total {} != allocated {} + unallocated {} (discrepancy {discrepancy}, leak {leak})",
                snapshot.total_capital, snapshot.allocated_capital, snapshot.unallocated_capital,
            ),
        });
    }

    if snapshot.unallocated_capital < Decimal::ZERO
        || allocations.values().any(|a| *a < Decimal::ZERO)
    {
        return ConservationResult::Anomaly(LedgerAnomaly {
            discrepancy,
            leak,
            message: "CAPITAL_ANOMALY: negative balance".to_owned(),
        });
    }

    if let Some(message) = audit_entries(initial_capital, snapshot, allocations, entries) {
        return ConservationResult::Anomaly(LedgerAnomaly {
            discrepancy,
            leak,
            message,
        });
    }

    ConservationResult::Balanced { discrepancy }
}

/// Fold the entry log and compare the result with the live balances.
///
/// Returns a description of the first mismatch, if any.
fn audit_entries(
    initial_capital: Decimal,
    snapshot: &CapitalSnapshot,
    allocations: &BTreeMap<AgentId, Decimal>,
    entries: &[LedgerEntry],
) -> Option<String> {
    let Some((pool, out, balances)) = fold_entries(initial_capital, entries) else {
        return Some("CAPITAL_ANOMALY: arithmetic overflow while folding entries".to_owned());
    };

    if pool != snapshot.unallocated_capital {
        return Some(format!(
            "CAPITAL_ANOMALY: entry log implies pool {pool}, ledger holds {}",
            snapshot.unallocated_capital
        ));
    }
    if out != snapshot.transferred_out_capital {
        return Some(format!(
            "CAPITAL_ANOMALY: entry log implies transferred out {out}, ledger holds {}",
            snapshot.transferred_out_capital
        ));
    }
    if &balances != allocations {
        return Some("CAPITAL_ANOMALY: entry log disagrees with agent balances".to_owned());
    }
    None
}

/// Replay entries from the initial capital: `(pool, transferred_out, balances)`.
///
/// Returns `None` on overflow. Zero balances are dropped.
fn fold_entries(
    initial_capital: Decimal,
    entries: &[LedgerEntry],
) -> Option<(Decimal, Decimal, BTreeMap<AgentId, Decimal>)> {
    let mut pool = initial_capital;
    let mut out = Decimal::ZERO;
    let mut balances: BTreeMap<AgentId, Decimal> = BTreeMap::new();

    for entry in entries {
        let balance = balances.entry(entry.agent_id).or_insert(Decimal::ZERO);
        match entry.entry_type {
            LedgerEntryType::Allocation => {
                pool = pool.checked_sub(entry.amount)?;
                *balance = balance.checked_add(entry.amount)?;
            }
            LedgerEntryType::Release => {
                pool = pool.checked_add(entry.amount)?;
                *balance = balance.checked_sub(entry.amount)?;
            }
            LedgerEntryType::TransferOut => {
                out = out.checked_add(entry.amount)?;
                *balance = balance.checked_sub(entry.amount)?;
            }
        }
    }
    balances.retain(|_, v| !v.is_zero());
    Some((pool, out, balances))
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly() -> ConservationResult {
    ConservationResult::Anomaly(LedgerAnomaly {
        discrepancy: Decimal::ZERO,
        leak: Decimal::ZERO,
        message: "CAPITAL_ANOMALY: arithmetic overflow while summing balances".to_owned(),
    })
}
