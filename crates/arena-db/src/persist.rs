//! Flushing a live arena to `SQLite` and rebuilding one from it.
//!
//! ```text
//! after each cycle
//!   |
//!   +-- persist_arena()   events + ledger entries not yet stored,
//!   |                     arena_state row            (one transaction)
//!
//! on startup
//!   |
//!   +-- load_arena()      stored events -> MemoryEventStore -> Arena::with_store
//! ```

use arena_core::{Arena, ArenaConfig, CycleCallback, CycleOutcome};
use arena_events::{EventFilter, EventStore, MemoryEventStore};
use chrono::Utc;

use crate::error::DbError;
use crate::event_table::{EventTable, insert_events};
use crate::ledger_table::{ArenaStateRecord, LedgerTable, insert_entries, upsert_arena_state};
use crate::sqlite::SqliteDb;

/// Rows per insert statement when flushing.
const FLUSH_BATCH_SIZE: usize = 200;

/// What a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// New rows in `events`.
    pub events_written: u64,
    /// New rows in `capital_ledger`.
    pub ledger_entries_written: u64,
    /// Cycle index recorded in `arena_state`.
    pub cycle_number: u64,
}

/// Flush everything the database does not have yet.
///
/// Only events and ledger entries past the highest stored sequence are
/// sent; the arena-state row is always rewritten. The whole flush is one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlite`] if any write fails; nothing is committed.
pub async fn persist_arena<S: EventStore>(
    db: &SqliteDb,
    arena: &Arena<S>,
) -> Result<PersistReport, DbError> {
    let stored_events = EventTable::new(db.pool()).last_sequence().await?;
    let stored_entries = LedgerTable::new(db.pool()).last_sequence().await?;

    let events = arena.query(&EventFilter::all().after(stored_events));
    let ledger = arena.state().ledger();
    let entries: Vec<_> = ledger
        .entries()
        .iter()
        .filter(|e| e.sequence > stored_entries)
        .cloned()
        .collect();
    let record = ArenaStateRecord {
        total_capital: ledger.total_capital(),
        arena_capital: arena.arena_capital(),
        cycle_number: arena.cycle(),
        updated_at: Utc::now(),
    };

    let mut tx = db.pool().begin().await?;
    let events_written = insert_events(&mut *tx, &events, FLUSH_BATCH_SIZE).await?;
    let ledger_entries_written = insert_entries(&mut *tx, &entries, FLUSH_BATCH_SIZE).await?;
    upsert_arena_state(&mut *tx, &record).await?;
    tx.commit().await?;

    tracing::debug!(
        events_written,
        ledger_entries_written,
        cycle = record.cycle_number,
        "Arena persisted"
    );

    Ok(PersistReport {
        events_written,
        ledger_entries_written,
        cycle_number: record.cycle_number,
    })
}

/// Rebuild an arena by folding the stored event log.
///
/// An empty database yields a fresh arena. A database written by an arena
/// with a different arena capital is refused, since its log would not fold
/// against this configuration.
///
/// # Errors
///
/// Returns [`DbError::Config`] on a capital mismatch, [`DbError::Store`] if
/// the stored log breaks causality, or [`DbError::Arena`] if an event does
/// not apply.
pub async fn load_arena(
    db: &SqliteDb,
    config: ArenaConfig,
) -> Result<Arena<MemoryEventStore>, DbError> {
    if let Some(stored) = LedgerTable::new(db.pool()).arena_state().await? {
        let configured = config.capital.arena_capital();
        if stored.arena_capital != configured {
            return Err(DbError::Config(format!(
                "stored arena capital {} does not match configured {configured}",
                stored.arena_capital
            )));
        }
    }

    let events = EventTable::new(db.pool()).replay(None).await?;
    let count = events.len();
    let store = MemoryEventStore::from_events(events)?;
    let arena = Arena::with_store(config, store)?;

    tracing::info!(
        events = count,
        cycle = arena.cycle(),
        "Arena loaded from SQLite"
    );
    Ok(arena)
}

/// Scheduler callback that flushes the arena after every cycle.
///
/// Failed cycles are flushed too: their completed sub-steps are part of the
/// log. A failed flush is logged and retried implicitly by the next one.
#[derive(Debug, Clone)]
pub struct PersistCallback {
    db: SqliteDb,
    flushes: u64,
    failures: u64,
}

impl PersistCallback {
    /// Flush into `db`.
    pub const fn new(db: SqliteDb) -> Self {
        Self {
            db,
            flushes: 0,
            failures: 0,
        }
    }

    /// Successful flushes so far.
    pub const fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Failed flushes so far.
    pub const fn failures(&self) -> u64 {
        self.failures
    }
}

impl<S: EventStore> CycleCallback<S> for PersistCallback {
    async fn on_cycle(&mut self, outcome: &CycleOutcome, arena: &Arena<S>) {
        match persist_arena(&self.db, arena).await {
            Ok(report) => {
                self.flushes = self.flushes.saturating_add(1);
                tracing::info!(
                    cycle_succeeded = outcome.success,
                    events_written = report.events_written,
                    ledger_entries_written = report.ledger_entries_written,
                    cycle = report.cycle_number,
                    "Cycle persisted"
                );
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                tracing::error!(error = %e, "Failed to persist cycle");
            }
        }
    }
}
