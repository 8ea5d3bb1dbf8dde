//! Revision generation and application against a SQLite database.
use std::path::PathBuf;

use log::{debug, info, warn};

use dres_registry::{ColumnDef, ModelDefinition};
use dres_store::{
    column_exists, open_connection, table_exists, StoreError, CHECKSUMS_DDL, MIGRATIONS_DDL,
};

use crate::MigrationError;

/// Something that can turn a model into revision files and apply them.
///
/// The production implementation is [SqlMigrationTool]; tests wrap it to observe which revisions
/// get generated.
pub trait MigrationTool {
    /// Diff `model` against the live database and, if they differ, write a revision file that
    /// closes the gap.  Returns the path of the written file, or None when there was nothing to
    /// do.
    fn generate_revision(
        &self,
        model: &ModelDefinition,
        message: &str,
    ) -> Result<Option<PathBuf>, MigrationError>;

    /// Write the revision that creates the bookkeeping tables themselves, if it doesn't already
    /// exist.  This one can't be generated from a model; it is the floor everything else stands
    /// on.
    fn ensure_bookkeeping_revision(&self) -> Result<Option<PathBuf>, MigrationError>;

    /// Apply every revision file in the migrations directory which hasn't been applied yet, in
    /// name order, all within one transaction.  Returns how many were applied.
    fn upgrade_to_head(&self) -> Result<usize, MigrationError>;
}

// Two replicas can race to generate a revision for the same unseen table, and the loser's file
// still gets applied.  Creates are made idempotent here; column additions are guarded at apply
// time instead, since SQLite's ADD COLUMN has no conditional form.
const CREATE_TABLE_TEMPLATE: &str = r#"-- {{ message }}
CREATE TABLE IF NOT EXISTS `{{ table }}` (
    {{ body }}
);
"#;

const UPDATE_TABLE_TEMPLATE: &str = r#"-- {{ message }}
{% for c in additions %}ALTER TABLE `{{ table }}` ADD COLUMN {{ c }};
{% endfor %}"#;

/// The ledger of applied revision files, kept in the same database the revisions target.
const REVISIONS_DDL: &str = r#"CREATE TABLE IF NOT EXISTS revisions (
    -- Base name of the revision file.
    name TEXT PRIMARY KEY,
    -- The specific sql run for this revision, which can be useful for debugging.
    sql TEXT NOT NULL,
    -- Unix timestamp as real seconds.
    ran_at REAL,
    -- Duration taken as real seconds.
    duration REAL NOT NULL
)"#;

pub struct SqlMigrationTool {
    db_path: PathBuf,
    migrations_directory: PathBuf,
}

impl SqlMigrationTool {
    pub fn new(db_path: PathBuf, migrations_directory: PathBuf) -> SqlMigrationTool {
        SqlMigrationTool {
            db_path,
            migrations_directory,
        }
    }

    /// The next free sequence number, from the files already in the directory.  Sequence 0 is
    /// reserved for the bookkeeping revision.
    fn next_sequence(&self) -> Result<u64, MigrationError> {
        let mut max = 0u64;
        let entries = match std::fs::read_dir(&self.migrations_directory) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(seq) = name.split('_').next().and_then(|s| s.parse::<u64>().ok()) {
                max = max.max(seq);
            }
        }
        Ok(max + 1)
    }

    fn write_revision(&self, sequence: u64, message: &str, sql: &str) -> Result<PathBuf, MigrationError> {
        std::fs::create_dir_all(&self.migrations_directory)?;
        let path = self
            .migrations_directory
            .join(format!("{:012}_{}.sql", sequence, slugify(message)));
        std::fs::write(&path, sql)?;
        info!("Wrote revision {:?}", path);
        Ok(path)
    }

    /// The columns the live table actually has, per pragma table_info.
    fn live_columns(
        &self,
        conn: &rusqlite::Connection,
        table: &str,
    ) -> Result<Vec<String>, MigrationError> {
        let mut statement = conn.prepare("SELECT name FROM pragma_table_info(?)")?;
        let rows = statement.query_map(rusqlite::params![table], |row| row.get::<_, String>(0))?;
        let mut out = vec![];
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn render_create(&self, model: &ModelDefinition, message: &str) -> Result<String, MigrationError> {
        let mut lines: Vec<String> = model.iter_columns().map(column_clause).collect();
        let pk: Vec<String> = model
            .iter_primary_key()
            .map(|c| format!("`{}`", c.get_name()))
            .collect();
        if !pk.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }
        for column in model.iter_columns() {
            if let Some(fk) = column.get_foreign_key() {
                lines.push(format!(
                    "FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`)",
                    column.get_name(),
                    fk.table,
                    fk.field
                ));
            }
        }

        let mut context = tera::Context::new();
        context.insert("message", message);
        context.insert("table", model.get_table_name());
        context.insert("body", &lines.join(",\n    "));
        let sql = tera::Tera::one_off(CREATE_TABLE_TEMPLATE, &context, false)?;
        debug!("Create revision for {}: {}", model.get_table_name(), sql);
        Ok(sql)
    }

    fn render_update(
        &self,
        model: &ModelDefinition,
        additions: &[&ColumnDef],
        message: &str,
    ) -> Result<String, MigrationError> {
        let clauses: Vec<String> = additions
            .iter()
            .map(|column| {
                // SQLite refuses to add a NOT NULL column without a default to a table that may
                // already hold rows, so added columns always land nullable.
                if !column.is_nullable() {
                    warn!(
                        "Column {}.{} is required but is being added to an existing table; it will be nullable",
                        model.get_table_name(),
                        column.get_name()
                    );
                }
                format!("`{}` {}", column.get_name(), column.get_column_type().sql_type())
            })
            .collect();

        let mut context = tera::Context::new();
        context.insert("message", message);
        context.insert("table", model.get_table_name());
        context.insert("additions", &clauses);
        let sql = tera::Tera::one_off(UPDATE_TABLE_TEMPLATE, &context, false)?;
        debug!("Update revision for {}: {}", model.get_table_name(), sql);
        Ok(sql)
    }
}

impl MigrationTool for SqlMigrationTool {
    fn generate_revision(
        &self,
        model: &ModelDefinition,
        message: &str,
    ) -> Result<Option<PathBuf>, MigrationError> {
        let conn = open_connection(&self.db_path)?;
        let table = model.get_table_name();

        if !table_exists(&conn, table)? {
            let sql = self.render_create(model, message)?;
            let path = self.write_revision(self.next_sequence()?, message, &sql)?;
            return Ok(Some(path));
        }

        let live = self.live_columns(&conn, table)?;
        let additions: Vec<&ColumnDef> = model
            .iter_columns()
            .filter(|c| !live.iter().any(|l| l == c.get_name()))
            .collect();
        for name in &live {
            if model.get_column(name).is_none() {
                warn!(
                    "Live table {} has column {} with no counterpart in the descriptor; leaving it in place",
                    table, name
                );
            }
        }
        if additions.is_empty() {
            debug!("Table {} already matches its model; no revision needed", table);
            return Ok(None);
        }

        let sql = self.render_update(model, &additions, message)?;
        let path = self.write_revision(self.next_sequence()?, message, &sql)?;
        Ok(Some(path))
    }

    fn ensure_bookkeeping_revision(&self) -> Result<Option<PathBuf>, MigrationError> {
        std::fs::create_dir_all(&self.migrations_directory)?;
        let path = self
            .migrations_directory
            .join("000000000000_create_bookkeeping_tables.sql");
        if path.exists() {
            return Ok(None);
        }
        let sql = format!(
            "-- Create the bookkeeping tables.\n{}\n{}",
            CHECKSUMS_DDL, MIGRATIONS_DDL
        );
        std::fs::write(&path, sql)?;
        info!("Wrote bookkeeping revision {:?}", path);
        Ok(Some(path))
    }

    fn upgrade_to_head(&self) -> Result<usize, MigrationError> {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&self.migrations_directory) {
            Ok(entries) => {
                let mut out = vec![];
                for entry in entries {
                    let path = entry?.path();
                    if path.extension().map(|e| e == "sql").unwrap_or(false) {
                        out.push(path);
                    }
                }
                out
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No migrations directory at {:?}; nothing to apply", self.migrations_directory);
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        files.sort();

        let mut conn = open_connection(&self.db_path)?;
        let transaction = conn.transaction().map_err(StoreError::Sqlite)?;
        transaction.execute(REVISIONS_DDL, [])?;

        let mut applied = 0;
        for path in files {
            let name = match path.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => continue,
            };
            let already_ran = transaction
                .prepare("SELECT * FROM revisions WHERE name = ?")?
                .exists(rusqlite::params![name])?;
            if already_ran {
                continue;
            }

            let raw = std::fs::read_to_string(&path)?;
            let sql = drop_applied_additions(&transaction, &raw)?;
            let ran_at = dres_store::unix_now();
            let start_time = std::time::Instant::now();
            transaction.execute_batch(&sql)?;
            let duration = start_time.elapsed().as_secs_f64();

            transaction.execute(
                "INSERT INTO revisions(name, sql, ran_at, duration) VALUES(?, ?, ?, ?)",
                rusqlite::params![name, sql, ran_at, duration],
            )?;
            info!("Applied revision {}", name);
            applied += 1;
        }

        transaction.commit().map_err(StoreError::Sqlite)?;
        Ok(applied)
    }
}

/// Drop ADD COLUMN statements whose column already exists on the live table.
///
/// Update revisions emit one `ALTER TABLE ... ADD COLUMN ...;` per line, so a revision generated
/// by a replica that lost the generation race applies as a no-op instead of wedging the ledger.
fn drop_applied_additions(
    conn: &rusqlite::Connection,
    sql: &str,
) -> Result<String, MigrationError> {
    let mut kept: Vec<&str> = vec![];
    for line in sql.lines() {
        if let Some((table, column)) = parse_add_column(line.trim()) {
            if column_exists(conn, table, column)? {
                debug!("Column {}.{} already present; skipping its addition", table, column);
                continue;
            }
        }
        kept.push(line);
    }
    Ok(kept.join("\n"))
}

/// Pick the table and column out of a generated `ALTER TABLE ... ADD COLUMN ...` statement.
fn parse_add_column(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("ALTER TABLE `")?;
    let (table, rest) = rest.split_once("` ADD COLUMN `")?;
    let (column, _) = rest.split_once('`')?;
    Some((table, column))
}

/// One line of a CREATE TABLE body.
fn column_clause(column: &ColumnDef) -> String {
    let mut out = format!(
        "`{}` {}",
        column.get_name(),
        column.get_column_type().sql_type()
    );
    if !column.is_nullable() {
        out.push_str(" NOT NULL");
    }
    out
}

/// Lowercase, with every run of non-alphanumerics collapsed to one underscore.
fn slugify(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut last_was_sep = true;
    for c in message.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
