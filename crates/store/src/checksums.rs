//! The checksums bookkeeping table.
//!
//! One row per data resource.  The checksum is the canonical digest of the resource's schema; the
//! descriptor JSON is the full document that produced it, retained so that a fresh process can
//! rebuild every model from the database alone.
use std::path::Path;

use log::warn;
use rusqlite::{Connection, OptionalExtension};

use crate::db::{self, unix_now};
use crate::error::{classify, StoreError};

pub const CHECKSUMS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS checksums (
    -- The table name of the resource, which is its identity.
    data_resource TEXT PRIMARY KEY,
    -- Hex digest of the canonical schema.
    model_checksum TEXT NOT NULL,
    -- The full descriptor document, as JSON text.  Rows written before this column existed
    -- hold NULL here.
    descriptor_json TEXT,
    -- Unix timestamp, seconds.
    date_modified REAL NOT NULL
) WITHOUT ROWID;
"#;

/// One row of the checksums table.
#[derive(Debug, Clone)]
pub struct ChecksumRecord {
    pub data_resource: String,
    pub model_checksum: String,
    pub descriptor_json: Option<serde_json::Value>,
    pub date_modified: f64,
}

/// Handle on the checksums table of a bookkeeping database.
pub struct ChecksumStore {
    conn: Connection,
}

impl ChecksumStore {
    pub fn open(path: &Path) -> Result<ChecksumStore, StoreError> {
        Ok(ChecksumStore {
            conn: db::open_connection(path)?,
        })
    }

    /// Wrap an already-open connection.  Mostly for tests.
    pub fn with_connection(conn: Connection) -> ChecksumStore {
        ChecksumStore { conn }
    }

    /// Check that the table is present and the database answers.  This is the readiness probe the
    /// bootstrap sequence spins on.
    pub fn probe(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM checksums", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|e| classify(&self.conn, "checksums", e))?;
        Ok(())
    }

    /// Fetch the record for a resource, if any.
    pub fn get(&self, data_resource: &str) -> Result<Option<ChecksumRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT data_resource, model_checksum, descriptor_json, date_modified
                 FROM checksums WHERE data_resource = ?",
                rusqlite::params![data_resource],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| classify(&self.conn, "checksums", e))?;
        Ok(row.map(|(data_resource, model_checksum, raw_descriptor, date_modified)| {
            ChecksumRecord {
                data_resource,
                model_checksum,
                descriptor_json: parse_descriptor_column(raw_descriptor),
                date_modified,
            }
        }))
    }

    /// Record a resource for the first time.  If a row for the resource already exists this warns
    /// and leaves the existing row alone; a sibling process won the race, and its row is as good
    /// as ours would have been.
    pub fn add(
        &self,
        data_resource: &str,
        model_checksum: &str,
        descriptor_json: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let res = self.conn.execute(
            "INSERT INTO checksums (data_resource, model_checksum, descriptor_json, date_modified)
             VALUES (?, ?, ?, ?)",
            rusqlite::params![
                data_resource,
                model_checksum,
                descriptor_json.to_string(),
                unix_now()
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) => match classify(&self.conn, "checksums", e) {
                StoreError::Constraint(_) => {
                    warn!(
                        "Checksum row for {} already present; keeping the existing row",
                        data_resource
                    );
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    /// Update the checksum and descriptor for an already-recorded resource.  Returns whether a
    /// row was actually updated.
    pub fn update(
        &self,
        data_resource: &str,
        model_checksum: &str,
        descriptor_json: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let rows = self
            .conn
            .execute(
                "UPDATE checksums
                 SET model_checksum = ?, descriptor_json = ?, date_modified = ?
                 WHERE data_resource = ?",
                rusqlite::params![
                    model_checksum,
                    descriptor_json.to_string(),
                    unix_now(),
                    data_resource
                ],
            )
            .map_err(|e| classify(&self.conn, "checksums", e))?;
        Ok(rows > 0)
    }

    /// All records, ordered by resource name.  Used at startup to replay stored descriptors.
    pub fn list_all(&self) -> Result<Vec<ChecksumRecord>, StoreError> {
        let mut statement = self
            .conn
            .prepare(
                "SELECT data_resource, model_checksum, descriptor_json, date_modified
                 FROM checksums ORDER BY data_resource",
            )
            .map_err(|e| classify(&self.conn, "checksums", e))?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(|e| classify(&self.conn, "checksums", e))?;
        let mut out = vec![];
        for row in rows {
            let (data_resource, model_checksum, raw_descriptor, date_modified) =
                row.map_err(StoreError::Sqlite)?;
            out.push(ChecksumRecord {
                data_resource,
                model_checksum,
                descriptor_json: parse_descriptor_column(raw_descriptor),
                date_modified,
            });
        }
        Ok(out)
    }
}

/// Parse the descriptor_json column leniently.  Legacy rows are NULL and a corrupt row shouldn't
/// take the whole startup replay down with it.
fn parse_descriptor_column(raw: Option<String>) -> Option<serde_json::Value> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Unparseable descriptor_json in checksums row: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn store() -> ChecksumStore {
        let conn = Connection::open_in_memory().expect("Should open in-memory db");
        conn.execute_batch(CHECKSUMS_DDL)
            .expect("Should create checksums table");
        ChecksumStore::with_connection(conn)
    }

    #[test]
    fn add_then_get_round_trips() {
        let store = store();
        let doc = serde_json::json!({"datastore": {"tablename": "credentials"}});
        store
            .add("credentials", "abc123", &doc)
            .expect("Should add");
        let rec = store
            .get("credentials")
            .expect("Should query")
            .expect("Should be present");
        assert_eq!(rec.data_resource, "credentials");
        assert_eq!(rec.model_checksum, "abc123");
        assert_eq!(rec.descriptor_json, Some(doc));
        assert!(rec.date_modified > 0.0);
    }

    #[test]
    fn duplicate_add_is_a_soft_failure() {
        let store = store();
        let doc = serde_json::json!({});
        store.add("r", "first", &doc).expect("Should add");
        store
            .add("r", "second", &doc)
            .expect("Duplicate add should not error");
        let rec = store.get("r").unwrap().unwrap();
        assert_eq!(rec.model_checksum, "first");
    }

    #[test]
    fn update_reports_whether_a_row_existed() {
        let store = store();
        let doc = serde_json::json!({});
        assert!(!store.update("r", "x", &doc).expect("Should run"));
        store.add("r", "x", &doc).expect("Should add");
        assert!(store.update("r", "y", &doc).expect("Should run"));
        assert_eq!(store.get("r").unwrap().unwrap().model_checksum, "y");
    }

    #[test]
    fn probe_distinguishes_missing_table() {
        let conn = Connection::open_in_memory().expect("Should open in-memory db");
        let store = ChecksumStore::with_connection(conn);
        let err = store.probe().expect_err("Table is missing");
        assert!(err.is_missing_table());
    }

    #[test]
    fn legacy_null_descriptor_is_none() {
        let store = store();
        store
            .conn
            .execute(
                "INSERT INTO checksums (data_resource, model_checksum, date_modified)
                 VALUES ('old', 'h', 1.0)",
                [],
            )
            .expect("Should insert");
        let rec = store.get("old").unwrap().unwrap();
        assert!(rec.descriptor_json.is_none());
    }

    #[test]
    fn corrupt_descriptor_json_is_none() {
        let store = store();
        store
            .conn
            .execute(
                "INSERT INTO checksums (data_resource, model_checksum, descriptor_json, date_modified)
                 VALUES ('bad', 'h', '{not json', 1.0)",
                [],
            )
            .expect("Should insert");
        let rec = store.get("bad").unwrap().unwrap();
        assert!(rec.descriptor_json.is_none());
    }

    #[test]
    fn list_all_is_ordered() {
        let store = store();
        let doc = serde_json::json!({});
        store.add("zebra", "1", &doc).unwrap();
        store.add("apple", "2", &doc).unwrap();
        let names: Vec<_> = store
            .list_all()
            .expect("Should list")
            .into_iter()
            .map(|r| r.data_resource)
            .collect();
        assert_eq!(names, vec!["apple", "zebra"]);
    }
}
