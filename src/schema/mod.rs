//! Schema registry
//!
//! The registry is the single source of truth for which columns a source's
//! store may hold. Nothing is inferred at runtime: a field only reaches a
//! store after someone adds it to the configured column list.

pub mod discover;
pub mod registry;

pub use discover::{find_duplicate_groups, profile_csv, schema_template, DuplicateGroup};
pub use registry::{Row, SchemaDefinition, SchemaRegistry};
