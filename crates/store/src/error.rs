//! Classified storage failures.
use crate::db::table_exists;

/// What went wrong talking to the bookkeeping database.
///
/// Classification happens here, at the rusqlite boundary.  Bootstrap branches on these variants: a
/// missing bookkeeping table triggers creation, an unreachable database triggers backoff, and anything
/// else is retried on the next poll tick.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The database could not be opened or the connection is unusable (locked, busy, not a database).
    #[error("database unreachable: {0}")]
    Unreachable(String),

    /// A bookkeeping table does not exist yet.
    #[error("table '{0}' does not exist")]
    MissingTable(String),

    /// A uniqueness or other constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }

    pub fn is_missing_table(&self) -> bool {
        matches!(self, StoreError::MissingTable(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

/// Classify a failed statement against `table`.
///
/// SQLite reports "no such table" under its generic error code, so rather than sniffing message strings
/// we ask `sqlite_master` whether the table exists.  If even that probe fails, the database itself is
/// unreachable.
pub(crate) fn classify(conn: &rusqlite::Connection, table: &str, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(cause, _) = &err {
        match cause.code {
            rusqlite::ErrorCode::ConstraintViolation => {
                return StoreError::Constraint(err.to_string());
            }
            rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::NotADatabase
            | rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked => {
                return StoreError::Unreachable(err.to_string());
            }
            _ => {}
        }
    }

    match table_exists(conn, table) {
        Ok(false) => StoreError::MissingTable(table.to_string()),
        Ok(true) => StoreError::Sqlite(err),
        Err(_) => StoreError::Unreachable(err.to_string()),
    }
}
