//! Durable copy of the arena event log.
//!
//! Events keep the sequence number the in-memory store assigned, so the
//! table order is the log order and a reload reproduces the same sequence.
//! Writes are idempotent on `event_id`: flushing an overlapping range twice
//! stores each event once.

use arena_types::{AgentId, Event, EventType};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::codec::{int_from_db, int_to_db, parse, time_from_db, time_to_db};
use crate::error::DbError;

/// Default batch size for event inserts.
const DEFAULT_BATCH_SIZE: usize = 100;

const TABLE: &str = "events";

const COLUMNS: &str = "sequence, event_id, event_type, agent_id, cycle, timestamp, data, caused_by";

/// Operations on the `events` table.
pub struct EventTable<'a> {
    pool: &'a SqlitePool,
    batch_size: usize,
}

impl<'a> EventTable<'a> {
    /// Create a new event table handle bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the batch size for inserts.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Store events, skipping any whose `event_id` is already present.
    ///
    /// Events are written with multi-row `VALUES` clauses, `batch_size` rows
    /// per statement, all inside one transaction: either every new event is
    /// committed or none is.
    ///
    /// Returns the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if an insert fails, including a sequence
    /// number already taken by a different event.
    pub async fn append_events(&self, events: &[Event]) -> Result<u64, DbError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let written = insert_events(&mut *tx, events, self.batch_size).await?;
        tx.commit().await?;

        tracing::debug!(count = events.len(), written, "Inserted events");
        Ok(written)
    }

    /// Stored events matching the optional type and agent, in log order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails, or [`DbError::Decode`]
    /// if a row cannot be decoded.
    pub async fn query_events(
        &self,
        event_type: Option<EventType>,
        agent_id: Option<AgentId>,
    ) -> Result<Vec<Event>, DbError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM events WHERE 1 = 1"));
        if let Some(event_type) = event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(agent_id) = agent_id {
            builder.push(" AND agent_id = ").push_bind(agent_id.to_string());
        }
        builder.push(" ORDER BY sequence");

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Event::try_from).collect()
    }

    /// Every stored event, or only those about `agent_id`, in log order.
    ///
    /// # Errors
    ///
    /// See [`EventTable::query_events`].
    pub async fn replay(&self, agent_id: Option<AgentId>) -> Result<Vec<Event>, DbError> {
        self.query_events(None, agent_id).await
    }

    /// Highest stored sequence number, or 0 when the table is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn last_sequence(&self) -> Result<u64, DbError> {
        let last: i64 = sqlx::query_scalar(r"SELECT COALESCE(MAX(sequence), 0) FROM events")
            .fetch_one(self.pool)
            .await?;
        int_from_db(TABLE, last)
    }

    /// Number of stored events.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn count(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(r"SELECT COUNT(*) FROM events")
            .fetch_one(self.pool)
            .await?;
        int_from_db(TABLE, count)
    }
}

/// Insert `events` on an open connection, `batch_size` rows per statement.
pub(crate) async fn insert_events(
    conn: &mut SqliteConnection,
    events: &[Event],
    batch_size: usize,
) -> Result<u64, DbError> {
    let mut written = 0_u64;
    for chunk in events.chunks(batch_size.max(1)) {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO events ({COLUMNS}) "));
        builder.push_values(chunk, |mut row, event| {
            row.push_bind(int_to_db(event.sequence))
                .push_bind(event.event_id.to_string())
                .push_bind(event.event_type.as_str())
                .push_bind(event.agent_id.map(|id| id.to_string()))
                .push_bind(int_to_db(event.cycle))
                .push_bind(time_to_db(&event.timestamp))
                .push_bind(event.data.to_string())
                .push_bind(event.caused_by.map(|id| id.to_string()));
        });
        builder.push(" ON CONFLICT (event_id) DO NOTHING");

        let result = builder.build().execute(&mut *conn).await?;
        written = written.saturating_add(result.rows_affected());
    }
    Ok(written)
}

/// A row from the `events` table.
///
/// Uses runtime types rather than compile-time checked types to
/// avoid requiring a database during builds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Position in the log.
    pub sequence: i64,
    /// Event id (hyphenated UUID).
    pub event_id: String,
    /// Event type name.
    pub event_type: String,
    /// Agent the event is about, if any.
    pub agent_id: Option<String>,
    /// Evolution cycle index.
    pub cycle: i64,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// JSON payload.
    pub data: String,
    /// Causing event id, if any.
    pub caused_by: Option<String>,
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: parse(TABLE, &row.event_id)?,
            sequence: int_from_db(TABLE, row.sequence)?,
            event_type: parse(TABLE, &row.event_type)?,
            agent_id: row.agent_id.as_deref().map(|raw| parse(TABLE, raw)).transpose()?,
            cycle: int_from_db(TABLE, row.cycle)?,
            timestamp: time_from_db(TABLE, &row.timestamp)?,
            data: serde_json::from_str(&row.data)?,
            caused_by: row.caused_by.as_deref().map(|raw| parse(TABLE, raw)).transpose()?,
        })
    }
}
