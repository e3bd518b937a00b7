//! # mdl-harvest - schema-stable incremental catalog harvesting
//!
//! Turns nested dataset metadata fetched from microdata catalog APIs into flat
//! CSV stores whose columns never drift between runs.
//!
//! ## Modules
//!
//! - **flatten**: nested record → dotted-path keys
//! - **prefix**: rewrite source sections into canonical namespaces
//! - **schema**: per-source fixed column lists, plus legacy-store discovery
//! - **project**: flatten + remap + project in one step
//! - **merge**: append-only reconciliation against an existing store
//! - **store**: CSV load/save with header enforcement and atomic replace
//! - **ingest** / **pipeline** / **config**: reading batches, running one
//!   source end to end, and the JSON configuration file
//! - **logging**: stderr subscriber setup for the binaries
//!
//! ## Quick Start
//!
//! ```rust
//! use mdl_harvest::{merge, FlattenConfig, PrefixRules, RawValue, RowProjector, SchemaDefinition, Store};
//! use serde_json::json;
//!
//! # fn main() -> mdl_harvest::Result<()> {
//! let schema = SchemaDefinition::new(
//!     "worldbank",
//!     "id",
//!     vec!["id".into(), "study.version_statement.version".into()],
//! )?;
//! let rules = PrefixRules::new([("id", "id"), ("study_desc", "study")]);
//! let flatten = FlattenConfig::default();
//!
//! let raw = RawValue::from(json!({
//!     "id": 101,
//!     "study_desc": {"version_statement": {"version": "1.0"}},
//!     "schematype": "survey"
//! }));
//! let row = RowProjector::new(&flatten, &rules, &schema).build_row(&raw)?;
//!
//! let outcome = merge(Store::empty(schema.clone()), vec![row])?;
//! assert_eq!(outcome.appended.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod flatten;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod prefix;
pub mod project;
pub mod schema;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{HarvestConfig, SourceConfig};
pub use error::{HarvestError, Result};
pub use flatten::{flatten, FlatRecord, FlattenConfig, RawValue, Scalar, SequencePolicy};
pub use ingest::{read_records, IngestOptions};
pub use merge::{merge, MergeOutcome, MergeReport};
pub use pipeline::{run_incremental, DropStage, RunOptions, RunSummary, SourcePipeline};
pub use prefix::{remap, CanonicalRecord, PrefixRules};
pub use project::{build_row, ProjectedBatch, RowProjector};
pub use schema::{Row, SchemaDefinition, SchemaRegistry};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_projection_and_merge() {
        let schema = SchemaDefinition::new(
            "unhcr",
            "id",
            vec!["id".to_string(), "title".to_string(), "info.notes".to_string()],
        )
        .unwrap();
        let rules = PrefixRules::new([("id", "id"), ("title", "title"), ("study_info", "info")]);
        let flatten = FlattenConfig::default();
        let projector = RowProjector::new(&flatten, &rules, &schema);

        let batch = projector
            .project_batch(vec![
                RawValue::from(json!({"id": 1, "title": "A", "study_info": {"notes": "n"}})),
                RawValue::from(json!({"id": 2, "title": "B", "extra_field": "Extra"})),
            ])
            .unwrap();

        let merged = merge(Store::empty(schema.clone()), batch.rows)
            .unwrap()
            .into_merged();

        assert_eq!(merged.len(), 2);
        for row in merged.rows() {
            assert_eq!(row.columns(), schema.columns());
        }
    }
}
