//! Descriptor documents and where they come from.
//!
//! A descriptor is a JSON document describing one data resource: the table it persists to, the field
//! schema of that table, and the per-verb API policy the serving layer should enforce.  This crate owns
//! parsing and validation of those documents, the canonical schema checksum that change detection hangs
//! off of, and the enumeration of descriptors from schema directories and inline lists.
//!
//! Nothing here touches the database; the reconciliation engine consumes [Descriptor] values and decides
//! what to do with them.
mod descriptor;
mod source;

pub use descriptor::*;
pub use source::*;
