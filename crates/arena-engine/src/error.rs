//! Error types for the Arena engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the scheduler run.

use rust_decimal::Decimal;

/// Top-level error for the Arena engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: arena_core::ConfigError,
    },

    /// Opening, migrating, or writing the database failed.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: arena_db::DbError,
    },

    /// Seeding the initial population failed.
    #[error("seeding error: {source}")]
    Seed {
        /// The underlying arena error.
        #[from]
        source: arena_core::ArenaError,
    },

    /// The ledger did not balance at shutdown.
    #[error("capital not conserved at shutdown (discrepancy {discrepancy})")]
    Conservation {
        /// Signed difference between ledger total and its parts.
        discrepancy: Decimal,
    },
}
