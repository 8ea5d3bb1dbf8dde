//! Engine error types.
use dres_store::StoreError;

/// Failures while generating or applying revisions.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MigrationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Failures of the startup sequence itself.
///
/// Most startup problems are just the underlying error passed along; this exists so callers can
/// tell "the database never came up" apart from everything else.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BootstrapError {
    #[error("database still unreachable after {retries} attempts: {last_error}")]
    DatabaseUnavailable { retries: u32, last_error: String },
}
