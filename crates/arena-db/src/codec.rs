//! Column encodings shared by the table modules.
//!
//! `SQLite` has no native UUID, decimal, or unsigned 64-bit type, so ids and
//! amounts travel as TEXT and sequence numbers as signed INTEGER.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DbError;

/// Encode a sequence number or cycle index.
pub(crate) fn int_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Decode a sequence number or cycle index.
pub(crate) fn int_from_db(table: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::decode(table, format!("{value}: {e}")))
}

/// Encode a timestamp as RFC 3339 with nanoseconds.
pub(crate) fn time_to_db(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp written by [`time_to_db`].
pub(crate) fn time_from_db(table: &'static str, raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DbError::decode(table, format!("timestamp {raw:?}: {e}")))
}

/// Parse any `FromStr` column value (ids, decimals, enum names).
pub(crate) fn parse<T>(table: &'static str, raw: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e: T::Err| DbError::decode(table, format!("{raw:?}: {e}")))
}
