//! The reconciliation engine.
//!
//! This crate ties the other pieces together: it takes parsed descriptors, decides whether each
//! one is new, unchanged, or drifted relative to what the bookkeeping database remembers, and
//! drives the migration tool to bring the live schema in line.  It also owns the startup
//! sequence, which must cope with a database that isn't up yet, was written by an older
//! deployment, or belongs to a node whose local migration directory is empty.
//!
//! The entry points are [bootstrap::initialize], which returns a ready [ReconciliationEngine],
//! and [monitor::run], which polls descriptor sources forever.
mod backoff;
pub mod bootstrap;
mod config;
mod error;
pub mod monitor;
mod reconcile;
mod runner;
mod tool;

pub use backoff::*;
pub use config::*;
pub use error::*;
pub use reconcile::*;
pub use runner::*;
pub use tool::*;
