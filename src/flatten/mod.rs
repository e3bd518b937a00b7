//! Flattening of nested catalog records
//!
//! Turns one nested record into a flat mapping of dotted path → scalar.
//! Scalar lists collapse into a single joined value and object lists follow a
//! per-field [`SequencePolicy`], so the set of keys a source can produce stays
//! bounded regardless of list lengths.

pub mod flattener;
pub mod value;

pub use flattener::{flatten, FlatRecord, FlattenConfig, Flattener, SequencePolicy};
pub use value::{RawValue, Scalar};
