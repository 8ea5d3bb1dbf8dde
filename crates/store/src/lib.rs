//! Bookkeeping persistence for the reconciliation engine.
//!
//! Two tables live here: `checksums`, which stores one row per reconciled table (model checksum plus the
//! raw descriptor document), and `migrations`, which stores generated revision files so a fresh node can
//! rebuild its local migration directory from the database alone.
//!
//! Each store owns its own connection, and every operation is a single short-lived statement; nothing is
//! ever held open across a migration-tool invocation.  Failures cross this boundary already classified
//! (unreachable vs. missing table vs. constraint), so callers never inspect driver internals.
mod artifacts;
mod checksums;
mod db;
mod error;
mod legacy;

pub use artifacts::*;
pub use checksums::*;
pub use db::*;
pub use error::*;
pub use legacy::*;
