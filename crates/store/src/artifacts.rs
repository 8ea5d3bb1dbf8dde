//! The migrations bookkeeping table.
//!
//! Every revision file the engine writes gets mirrored here as a blob, keyed by file name.  A
//! fresh process with an empty migrations directory can then restore the whole revision history
//! from the database before upgrading.
use std::path::Path;

use log::{debug, info, warn};
use rusqlite::Connection;

use crate::db;
use crate::error::{classify, StoreError};

pub const MIGRATIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    -- Base name of the revision file.
    file_name TEXT PRIMARY KEY,
    -- The file's contents, verbatim.
    file_blob BLOB NOT NULL
) WITHOUT ROWID;
"#;

/// Handle on the migrations table of a bookkeeping database.
pub struct MigrationStore {
    conn: Connection,
}

impl MigrationStore {
    pub fn open(path: &Path) -> Result<MigrationStore, StoreError> {
        Ok(MigrationStore {
            conn: db::open_connection(path)?,
        })
    }

    pub fn with_connection(conn: Connection) -> MigrationStore {
        MigrationStore { conn }
    }

    /// Save one revision file.  Saving the same file name twice is a no-op; the first writer's
    /// copy stands.
    pub fn save(&self, file_name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let rows = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO migrations (file_name, file_blob) VALUES (?, ?)",
                rusqlite::params![file_name, contents],
            )
            .map_err(|e| classify(&self.conn, "migrations", e))?;
        if rows == 0 {
            debug!("Migration artifact {} already saved", file_name);
        }
        Ok(())
    }

    /// Write every stored revision file into a directory, creating it if needed.  Existing files
    /// with the same names are overwritten.  Returns how many files were written.
    pub fn restore_all_to_directory(&self, directory: &Path) -> Result<usize, StoreError> {
        std::fs::create_dir_all(directory)?;
        let mut statement = self
            .conn
            .prepare("SELECT file_name, file_blob FROM migrations ORDER BY file_name")
            .map_err(|e| classify(&self.conn, "migrations", e))?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| classify(&self.conn, "migrations", e))?;
        let mut written = 0;
        for row in rows {
            let (file_name, blob) = row.map_err(StoreError::Sqlite)?;
            // A stored name with path separators would escape the directory; keep the base name.
            let base = match Path::new(&file_name).file_name() {
                Some(b) => b.to_owned(),
                None => {
                    warn!("Skipping migration artifact with unusable name {:?}", file_name);
                    continue;
                }
            };
            if base != file_name.as_str() {
                warn!(
                    "Migration artifact name {:?} contains path components; restoring as {:?}",
                    file_name, base
                );
            }
            std::fs::write(directory.join(&base), &blob)?;
            written += 1;
        }
        info!("Restored {} migration artifacts to {:?}", written, directory);
        Ok(written)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .map_err(|e| classify(&self.conn, "migrations", e))?;
        Ok(n as usize)
    }
}
