//! Error types for the storage backend.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors with context about which operation failed.

use arena_core::ArenaError;
use arena_events::EventStoreError;

/// Errors that can occur in the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A migration failed.
    #[error("SQLite migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be turned back into a domain value.
    #[error("Decode error in {table}: {reason}")]
    Decode {
        /// The table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The stored log could not be loaded into an event store.
    #[error("Stored log rejected: {0}")]
    Store(#[from] EventStoreError),

    /// Rebuilding the arena from the stored log failed.
    #[error("Arena rebuild failed: {0}")]
    Arena(#[source] Box<ArenaError>),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ArenaError> for DbError {
    fn from(err: ArenaError) -> Self {
        Self::Arena(Box::new(err))
    }
}

impl DbError {
    /// Build a decode error for `table`.
    pub(crate) fn decode(table: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            table,
            reason: reason.to_string(),
        }
    }
}
