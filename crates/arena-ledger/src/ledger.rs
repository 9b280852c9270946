//! The capital ledger: pool and agent balances plus an append-only entry log.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Closed pool**: capital only moves between the pool and agents, or out
//!   of the ledger through a transfer-out.
//! - **Precision**: all amounts use [`Decimal`] -- no floating point.
//! - **Check before move**: every mutation validates first and leaves the
//!   ledger untouched on error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use arena_types::{
    AgentId, CapitalBreakdown, CapitalSnapshot, EventId, LedgerEntry, LedgerEntryId,
    LedgerEntryType,
};

use crate::LedgerError;
use crate::conservation::{ConservationResult, verify_conservation};

/// Round an amount down to whole cents.
pub fn floor_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// The event a ledger movement belongs to.
///
/// Entries take their id and timestamp from the event that caused them, so
/// folding the same events twice yields identical ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStamp {
    /// The event being applied.
    pub event_id: EventId,
    /// The event's timestamp.
    pub at: DateTime<Utc>,
}

impl EntryStamp {
    /// Stamp an entry with the current time.
    pub fn now(event_id: EventId) -> Self {
        Self {
            event_id,
            at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The simulation-tier capital ledger.
///
/// Holds the arena pool split into an unallocated remainder and per-agent
/// allocations, plus the running total transferred out to the proving tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapitalLedger {
    /// Capital the ledger was created with.
    initial_capital: Decimal,
    /// Capital still managed here (`initial - transferred_out`).
    total_capital: Decimal,
    /// Capital in the pool.
    unallocated: Decimal,
    /// Capital moved to the proving tier.
    transferred_out: Decimal,
    /// Non-zero agent balances.
    allocations: BTreeMap<AgentId, Decimal>,
    /// All movements, in insertion order.
    entries: Vec<LedgerEntry>,
}

impl CapitalLedger {
    /// Create a ledger whose whole capital sits in the unallocated pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeCapital`] for a negative amount.
    pub fn new(capital: Decimal) -> Result<Self, LedgerError> {
        if capital < Decimal::ZERO {
            return Err(LedgerError::NegativeCapital { amount: capital });
        }
        Ok(Self {
            initial_capital: capital,
            total_capital: capital,
            unallocated: capital,
            transferred_out: Decimal::ZERO,
            allocations: BTreeMap::new(),
            entries: Vec::new(),
        })
    }

    /// Capital the ledger was created with.
    pub const fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Capital currently managed by the ledger.
    pub const fn total_capital(&self) -> Decimal {
        self.total_capital
    }

    /// Capital in the unallocated pool.
    pub const fn unallocated(&self) -> Decimal {
        self.unallocated
    }

    /// Capital transferred out so far.
    pub const fn transferred_out(&self) -> Decimal {
        self.transferred_out
    }

    /// Sum of all agent allocations.
    pub fn allocated(&self) -> Decimal {
        self.allocations.values().copied().sum()
    }

    /// One agent's balance (zero when it holds nothing).
    pub fn allocation(&self, agent_id: AgentId) -> Decimal {
        self.allocations
            .get(&agent_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// All non-zero agent balances.
    pub const fn allocations(&self) -> &BTreeMap<AgentId, Decimal> {
        &self.allocations
    }

    /// Every movement recorded so far.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Check that `amount` can move from the pool to an agent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonPositiveAmount`] or
    /// [`LedgerError::InsufficientCapital`].
    pub fn check_allocate(&self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount { amount });
        }
        if amount > self.unallocated {
            return Err(LedgerError::InsufficientCapital {
                requested: amount,
                available: self.unallocated,
            });
        }
        Ok(())
    }

    /// Move `amount` from the pool to `agent_id`.
    ///
    /// # Errors
    ///
    /// Fails without side effects when [`check_allocate`](Self::check_allocate)
    /// fails or the new balance overflows.
    pub fn allocate(
        &mut self,
        agent_id: AgentId,
        amount: Decimal,
        stamp: EntryStamp,
    ) -> Result<LedgerEntry, LedgerError> {
        self.check_allocate(amount)?;
        let balance = self
            .allocation(agent_id)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { agent_id })?;
        let unallocated = self
            .unallocated
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow { agent_id })?;

        self.unallocated = unallocated;
        self.allocations.insert(agent_id, balance);
        Ok(self.push_entry(LedgerEntryType::Allocation, agent_id, amount, stamp))
    }

    /// Return an agent's whole balance to the pool.
    ///
    /// Returns the amount released. An agent holding nothing releases zero
    /// and no entry is written.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the pool would overflow.
    pub fn release(&mut self, agent_id: AgentId, stamp: EntryStamp) -> Result<Decimal, LedgerError> {
        let amount = self.allocation(agent_id);
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let unallocated = self
            .unallocated
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { agent_id })?;

        self.unallocated = unallocated;
        self.allocations.remove(&agent_id);
        self.push_entry(LedgerEntryType::Release, agent_id, amount, stamp);
        tracing::debug!(agent_id = %agent_id, %amount, "Capital released to pool");
        Ok(amount)
    }

    /// Move an agent's whole balance out of the ledger.
    ///
    /// The managed total shrinks and the transferred-out total grows by the
    /// same amount, so nothing leaks. Returns the amount transferred.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the running totals overflow.
    pub fn transfer_out(
        &mut self,
        agent_id: AgentId,
        stamp: EntryStamp,
    ) -> Result<Decimal, LedgerError> {
        let amount = self.allocation(agent_id);
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let total = self
            .total_capital
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow { agent_id })?;
        let out = self
            .transferred_out
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { agent_id })?;

        self.total_capital = total;
        self.transferred_out = out;
        self.allocations.remove(&agent_id);
        self.push_entry(LedgerEntryType::TransferOut, agent_id, amount, stamp);
        tracing::debug!(agent_id = %agent_id, %amount, "Capital transferred out");
        Ok(amount)
    }

    /// Verify the conservation law against the current balances and the
    /// entry log.
    pub fn verify_conservation(&self) -> ConservationResult {
        verify_conservation(
            self.initial_capital,
            &self.snapshot(),
            &self.allocations,
            &self.entries,
        )
    }

    /// Current totals.
    pub fn snapshot(&self) -> CapitalSnapshot {
        CapitalSnapshot {
            total_capital: self.total_capital,
            allocated_capital: self.allocated(),
            unallocated_capital: self.unallocated,
            transferred_out_capital: self.transferred_out,
        }
    }

    /// Read-only breakdown for reporting.
    pub fn breakdown(&self) -> CapitalBreakdown {
        let allocated = self.allocated();
        let utilization = if self.total_capital > Decimal::ZERO {
            allocated
                .checked_div(self.total_capital)
                .and_then(|ratio| ratio.to_f64())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        CapitalBreakdown {
            total_capital: self.total_capital,
            allocated_capital: allocated,
            unallocated_capital: self.unallocated,
            transferred_out_capital: self.transferred_out,
            utilization,
            allocations: self.allocations.clone(),
        }
    }

    fn push_entry(
        &mut self,
        entry_type: LedgerEntryType,
        agent_id: AgentId,
        amount: Decimal,
        stamp: EntryStamp,
    ) -> LedgerEntry {
        let sequence = u64::try_from(self.entries.len())
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let entry = LedgerEntry {
            id: LedgerEntryId::from(stamp.event_id.into_inner()),
            sequence,
            entry_type,
            agent_id,
            amount,
            event_id: Some(stamp.event_id),
            created_at: stamp.at,
        };
        self.entries.push(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn stamp() -> EntryStamp {
        EntryStamp::now(EventId::new())
    }

    fn ledger(units: i64) -> CapitalLedger {
        match CapitalLedger::new(Decimal::new(units, 0)) {
            Ok(l) => l,
            Err(e) => panic!("ledger: {e}"),
        }
    }

    #[test]
    fn new_ledger_holds_everything_unallocated() {
        let l = ledger(53_600);
        assert_eq!(l.total_capital(), Decimal::new(53_600, 0));
        assert_eq!(l.unallocated(), Decimal::new(53_600, 0));
        assert_eq!(l.allocated(), Decimal::ZERO);
        assert!(l.verify_conservation().is_balanced());
    }

    #[test]
    fn negative_capital_is_rejected() {
        assert!(matches!(
            CapitalLedger::new(Decimal::new(-1, 0)),
            Err(LedgerError::NegativeCapital { .. })
        ));
    }

    #[test]
    fn allocate_moves_pool_to_agent() {
        let mut l = ledger(1_000);
        let agent = AgentId::new();
        let result = l.allocate(agent, Decimal::new(250, 0), stamp());
        assert!(result.is_ok());
        assert_eq!(l.allocation(agent), Decimal::new(250, 0));
        assert_eq!(l.unallocated(), Decimal::new(750, 0));
        assert_eq!(l.entries().len(), 1);
        assert_eq!(l.entries()[0].entry_type, LedgerEntryType::Allocation);
        assert!(l.verify_conservation().is_balanced());
    }

    #[test]
    fn over_allocation_fails_without_side_effects() {
        let mut l = ledger(100);
        let agent = AgentId::new();
        let err = l.allocate(agent, Decimal::new(101, 0), stamp());
        assert!(matches!(err, Err(LedgerError::InsufficientCapital { .. })));
        assert_eq!(l.unallocated(), Decimal::new(100, 0));
        assert!(l.entries().is_empty());
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        let l = ledger(100);
        assert!(l.check_allocate(Decimal::ZERO).is_err());
        assert!(l.check_allocate(Decimal::new(-5, 0)).is_err());
    }

    #[test]
    fn release_returns_capital_to_pool() {
        let mut l = ledger(1_000);
        let agent = AgentId::new();
        let _ = l.allocate(agent, Decimal::new(400, 0), stamp());
        let released = l.release(agent, stamp()).ok();
        assert_eq!(released, Some(Decimal::new(400, 0)));
        assert_eq!(l.unallocated(), Decimal::new(1_000, 0));
        assert_eq!(l.allocation(agent), Decimal::ZERO);
        assert!(l.verify_conservation().is_balanced());
    }

    #[test]
    fn release_of_empty_agent_writes_nothing() {
        let mut l = ledger(1_000);
        let released = l.release(AgentId::new(), stamp()).ok();
        assert_eq!(released, Some(Decimal::ZERO));
        assert!(l.entries().is_empty());
    }

    #[test]
    fn transfer_out_shrinks_total_without_gap() {
        let mut l = ledger(1_000);
        let agent = AgentId::new();
        let _ = l.allocate(agent, Decimal::new(300, 0), stamp());
        let moved = l.transfer_out(agent, stamp()).ok();
        assert_eq!(moved, Some(Decimal::new(300, 0)));
        assert_eq!(l.total_capital(), Decimal::new(700, 0));
        assert_eq!(l.transferred_out(), Decimal::new(300, 0));
        assert_eq!(l.unallocated(), Decimal::new(700, 0));
        assert!(l.verify_conservation().is_balanced());
    }

    #[test]
    fn breakdown_reports_utilization() {
        let mut l = ledger(1_000);
        let agent = AgentId::new();
        let _ = l.allocate(agent, Decimal::new(250, 0), stamp());
        let b = l.breakdown();
        assert_eq!(b.allocated_capital, Decimal::new(250, 0));
        assert!((b.utilization - 0.25).abs() < 1e-9);
        assert_eq!(b.allocations.get(&agent), Some(&Decimal::new(250, 0)));
    }

    #[test]
    fn entry_identity_follows_the_event() {
        let mut l = ledger(1_000);
        let event_id = EventId::new();
        let s = EntryStamp::now(event_id);
        let _ = l.allocate(AgentId::new(), Decimal::new(1, 0), s);
        assert_eq!(l.entries()[0].event_id, Some(event_id));
        assert_eq!(l.entries()[0].id.into_inner(), event_id.into_inner());
        assert_eq!(l.entries()[0].created_at, s.at);
    }

    #[test]
    fn floor_cents_truncates() {
        assert_eq!(floor_cents(Decimal::new(123_456, 3)), Decimal::new(12_345, 2));
        assert_eq!(floor_cents(Decimal::new(100, 0)), Decimal::new(100, 0));
    }
}
