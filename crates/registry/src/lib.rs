//! Runtime data-model definitions synthesized from descriptors.
//!
//! There are 3 primary entities:
//!
//! - The column type, mapping descriptor field types onto the handful of storage types we actually use.
//! - The model definition, an ordered list of column definitions for one table, built from a descriptor's
//!   field schema.
//! - The model registry, an explicit map from table name to model plus the API policy and restricted
//!   fields the serving layer needs.  The reconciliation engine owns one registry instance; there is no
//!   global state to enumerate.
//!
//! Synthesis is pure and repeatable: the same descriptor always produces the same model, and registering
//! it again just replaces the entry.
mod column;
mod model;
mod registry;

pub use column::*;
pub use model::*;
pub use registry::*;
