//! Upgrades for bookkeeping databases written by older deployments.
//!
//! The first deployed format had a checksums table without the descriptor_json column and no
//! migrations table at all.  This brings such a database up to the current shape in place;
//! running it against a current database is a no-op.
use std::path::Path;

use log::info;

use crate::artifacts::MIGRATIONS_DDL;
use crate::db;
use crate::error::{classify, StoreError};

pub fn upgrade_bookkeeping(path: &Path) -> Result<(), StoreError> {
    let conn = db::open_connection(path)?;
    if db::table_exists(&conn, "checksums")?
        && !db::column_exists(&conn, "checksums", "descriptor_json")?
    {
        info!("Adding descriptor_json column to legacy checksums table");
        conn.execute("ALTER TABLE checksums ADD COLUMN descriptor_json TEXT", [])
            .map_err(|e| classify(&conn, "checksums", e))?;
    }
    if !db::table_exists(&conn, "migrations")? {
        info!("Creating migrations table missing from legacy bookkeeping database");
        conn.execute_batch(MIGRATIONS_DDL)
            .map_err(|e| classify(&conn, "migrations", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::checksums::ChecksumStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn upgrades_a_legacy_database() {
        let dir = tempfile::tempdir().expect("Should make tempdir");
        let path = dir.path().join("book.sqlite");
        {
            let conn = db::open_connection(&path).expect("Should open");
            conn.execute_batch(
                "CREATE TABLE checksums (
                    data_resource TEXT PRIMARY KEY,
                    model_checksum TEXT NOT NULL,
                    date_modified REAL NOT NULL
                );
                INSERT INTO checksums VALUES ('old', 'h', 1.0);",
            )
            .expect("Should create legacy shape");
        }

        upgrade_bookkeeping(&path).expect("Should upgrade");

        let conn = db::open_connection(&path).expect("Should reopen");
        assert!(db::column_exists(&conn, "checksums", "descriptor_json").unwrap());
        assert!(db::table_exists(&conn, "migrations").unwrap());
        // The legacy row survives with a NULL descriptor.
        let store = ChecksumStore::with_connection(conn);
        let rec = store.get("old").expect("Should query").expect("Row kept");
        assert_eq!(rec.model_checksum, "h");
        assert!(rec.descriptor_json.is_none());
    }

    #[test]
    fn running_against_a_current_database_changes_nothing() {
        let dir = tempfile::tempdir().expect("Should make tempdir");
        let path = dir.path().join("book.sqlite");
        {
            let conn = db::open_connection(&path).expect("Should open");
            conn.execute_batch(crate::checksums::CHECKSUMS_DDL)
                .expect("Should create");
            conn.execute_batch(MIGRATIONS_DDL).expect("Should create");
        }
        upgrade_bookkeeping(&path).expect("First run");
        upgrade_bookkeeping(&path).expect("Second run");
    }
}
