//! Connection management and schema introspection.
use std::path::Path;

use rusqlite::Connection;

use crate::StoreError;

/// SQL that we run as part of opening a connection.
///
/// - Enables the busy timeout, since the engine and the serving workers share one database file.
/// - Sets up WAL so short bookkeeping writes don't block readers.
/// - Enables foreign key enforcement for the data tables the migrations create.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA foreign_keys = 1;
pragma journal_mode = WAL;
"#;

/// Open a connection to the bookkeeping database.  Open failures are, by definition, "unreachable".
pub fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn =
        Connection::open(path).map_err(|e| StoreError::Unreachable(e.to_string()))?;
    conn.execute_batch(INITIAL_SQL)
        .map_err(|e| StoreError::Unreachable(e.to_string()))?;
    Ok(conn)
}

/// Whether a table exists, per sqlite_master.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let mut statement = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
        .map_err(|e| StoreError::Unreachable(e.to_string()))?;
    statement
        .exists(rusqlite::params![table])
        .map_err(|e| StoreError::Unreachable(e.to_string()))
}

/// Whether a column exists on a table, per pragma table_info.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut statement = conn
        .prepare("SELECT 1 FROM pragma_table_info(?) WHERE name = ?")
        .map_err(|e| StoreError::Unreachable(e.to_string()))?;
    statement
        .exists(rusqlite::params![table, column])
        .map_err(StoreError::Sqlite)
}

/// Unix timestamp as real seconds, the format the bookkeeping tables use for their time columns.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
