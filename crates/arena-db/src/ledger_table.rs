//! Durable copy of the capital ledger and the arena-state row.
//!
//! Ledger entries are derived from events, so the table is a queryable
//! projection rather than a second source of truth: reloading an arena folds
//! the event log and never reads this table. Entries are flushed together
//! with the events that produced them.

use arena_types::{AgentId, LedgerEntry, LedgerEntryType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::codec::{int_from_db, int_to_db, parse, time_from_db, time_to_db};
use crate::error::DbError;

/// Default batch size for ledger inserts.
const DEFAULT_BATCH_SIZE: usize = 100;

const TABLE: &str = "capital_ledger";

const COLUMNS: &str = "entry_id, sequence, entry_type, agent_id, amount, event_id, created_at";

/// Operations on the `capital_ledger` and `arena_state` tables.
pub struct LedgerTable<'a> {
    pool: &'a SqlitePool,
    batch_size: usize,
}

impl<'a> LedgerTable<'a> {
    /// Create a new ledger table handle bound to a connection pool.
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

    /// Store ledger entries, skipping any whose id is already present.
    ///
    /// Returns the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if an insert fails.
    pub async fn append_entries(&self, entries: &[LedgerEntry]) -> Result<u64, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let written = insert_entries(&mut *tx, entries, self.batch_size).await?;
        tx.commit().await?;

        tracing::debug!(count = entries.len(), written, "Inserted ledger entries");
        Ok(written)
    }

    /// Every stored entry, or only those of `agent_id`, in ledger order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails, or [`DbError::Decode`]
    /// if a row cannot be decoded.
    pub async fn entries(&self, agent_id: Option<AgentId>) -> Result<Vec<LedgerEntry>, DbError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM capital_ledger"));
        if let Some(agent_id) = agent_id {
            builder.push(" WHERE agent_id = ").push_bind(agent_id.to_string());
        }
        builder.push(" ORDER BY sequence");

        let rows = builder
            .build_query_as::<LedgerRow>()
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// Highest stored ledger sequence number, or 0 when the table is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn last_sequence(&self) -> Result<u64, DbError> {
        let last: i64 =
            sqlx::query_scalar(r"SELECT COALESCE(MAX(sequence), 0) FROM capital_ledger")
                .fetch_one(self.pool)
                .await?;
        int_from_db(TABLE, last)
    }

    /// The stored arena-state row, if one has been written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails, or [`DbError::Decode`]
    /// if the row cannot be decoded.
    pub async fn arena_state(&self) -> Result<Option<ArenaStateRecord>, DbError> {
        let row = sqlx::query_as::<_, ArenaStateRow>(
            r"SELECT total_capital, arena_capital, cycle_number, updated_at
              FROM arena_state
              WHERE id = 1",
        )
        .fetch_optional(self.pool)
        .await?;
        row.map(ArenaStateRecord::try_from).transpose()
    }
}

/// Insert `entries` on an open connection, `batch_size` rows per statement.
pub(crate) async fn insert_entries(
    conn: &mut SqliteConnection,
    entries: &[LedgerEntry],
    batch_size: usize,
) -> Result<u64, DbError> {
    let mut written = 0_u64;
    for chunk in entries.chunks(batch_size.max(1)) {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO capital_ledger ({COLUMNS}) "));
        builder.push_values(chunk, |mut row, entry| {
            row.push_bind(entry.id.to_string())
                .push_bind(int_to_db(entry.sequence))
                .push_bind(entry.entry_type.as_str())
                .push_bind(entry.agent_id.to_string())
                .push_bind(entry.amount.to_string())
                .push_bind(entry.event_id.map(|id| id.to_string()))
                .push_bind(time_to_db(&entry.created_at));
        });
        builder.push(" ON CONFLICT (entry_id) DO NOTHING");

        let result = builder.build().execute(&mut *conn).await?;
        written = written.saturating_add(result.rows_affected());
    }
    Ok(written)
}

/// Write the single arena-state row, replacing any previous one.
pub(crate) async fn upsert_arena_state(
    conn: &mut SqliteConnection,
    record: &ArenaStateRecord,
) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO arena_state (id, total_capital, arena_capital, cycle_number, updated_at)
          VALUES (1, ?1, ?2, ?3, ?4)
          ON CONFLICT (id) DO UPDATE SET
            total_capital = excluded.total_capital,
            arena_capital = excluded.arena_capital,
            cycle_number = excluded.cycle_number,
            updated_at = excluded.updated_at",
    )
    .bind(record.total_capital.to_string())
    .bind(record.arena_capital.to_string())
    .bind(int_to_db(record.cycle_number))
    .bind(time_to_db(&record.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn entry_type_from_db(raw: &str) -> Result<LedgerEntryType, DbError> {
    [
        LedgerEntryType::Allocation,
        LedgerEntryType::Release,
        LedgerEntryType::TransferOut,
    ]
    .into_iter()
    .find(|t| t.as_str() == raw)
    .ok_or_else(|| DbError::decode(TABLE, format!("unknown entry type {raw:?}")))
}

/// A row from the `capital_ledger` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    /// Entry id (hyphenated UUID).
    pub entry_id: String,
    /// Position in the ledger.
    pub sequence: i64,
    /// Entry type name.
    pub entry_type: String,
    /// Agent on the non-pool side.
    pub agent_id: String,
    /// Exact decimal amount.
    pub amount: String,
    /// Producing event id.
    pub event_id: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse(TABLE, &row.entry_id)?,
            sequence: int_from_db(TABLE, row.sequence)?,
            entry_type: entry_type_from_db(&row.entry_type)?,
            agent_id: parse(TABLE, &row.agent_id)?,
            amount: parse(TABLE, &row.amount)?,
            event_id: row.event_id.as_deref().map(|raw| parse(TABLE, raw)).transpose()?,
            created_at: time_from_db(TABLE, &row.created_at)?,
        })
    }
}

/// Summary of the arena written alongside each flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaStateRecord {
    /// Capital currently managed by the ledger (after transfers out).
    pub total_capital: Decimal,
    /// Capital the ledger started with.
    pub arena_capital: Decimal,
    /// Current evolution cycle index.
    pub cycle_number: u64,
    /// When the row was written.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ArenaStateRow {
    total_capital: String,
    arena_capital: String,
    cycle_number: i64,
    updated_at: String,
}

impl TryFrom<ArenaStateRow> for ArenaStateRecord {
    type Error = DbError;

    fn try_from(row: ArenaStateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            total_capital: parse("arena_state", &row.total_capital)?,
            arena_capital: parse("arena_state", &row.arena_capital)?,
            cycle_number: int_from_db("arena_state", row.cycle_number)?,
            updated_at: time_from_db("arena_state", &row.updated_at)?,
        })
    }
}
