//! `SQLite` storage backend for the Arena evolution engine.
//!
//! The live arena keeps its event log in memory. This crate gives that log
//! a durable home: events, the capital-ledger projection, and a one-row
//! arena summary are flushed after each cycle, and an arena is rebuilt on
//! startup by folding the stored events through the same reducer the live
//! arena uses.
//!
//! # Architecture
//!
//! ```text
//! Evolution cycle
//!     |
//!     +-- append to MemoryEventStore (live log)
//!     |
//!     +-- PersistCallback ------> SQLite (SqliteDb)
//!         |-- EventTable         (append-only events)
//!         +-- LedgerTable        (capital movements + arena_state)
//! ```
//!
//! # Modules
//!
//! - [`sqlite`] -- connection pool, migrations, schema introspection
//! - [`event_table`] -- batched event insertion and querying
//! - [`ledger_table`] -- ledger entries and the arena-state row
//! - [`persist`] -- flush and reload of a whole arena
//! - [`error`] -- Shared error types

mod codec;
pub mod error;
pub mod event_table;
pub mod ledger_table;
pub mod persist;
pub mod sqlite;

// Re-export primary types for convenience.
pub use error::DbError;
pub use event_table::{EventRow, EventTable};
pub use ledger_table::{ArenaStateRecord, LedgerRow, LedgerTable};
pub use persist::{PersistCallback, PersistReport, load_arena, persist_arena};
pub use sqlite::{SqliteConfig, SqliteDb};
