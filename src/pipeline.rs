//! One incremental run for one source: load, project, merge, save

use crate::error::Result;
use crate::flatten::{FlatRecord, FlattenConfig, RawValue};
use crate::merge::{merge, MergeReport};
use crate::prefix::PrefixRules;
use crate::project::{RowProjector, SkippedRecord};
use crate::schema::SchemaDefinition;
use crate::store;
use std::path::Path;
use tracing::info;

/// Flattening settings, rule table and schema of one source
#[derive(Debug, Clone)]
pub struct SourcePipeline {
    pub flatten: FlattenConfig,
    pub rules: PrefixRules,
    pub schema: SchemaDefinition,
}

/// Where a flattened key was left out on its way to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropStage {
    /// No prefix rule matched the flattened key
    Rules,
    /// The canonical key is not a declared column
    Schema,
}

impl DropStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropStage::Rules => "rules",
            DropStage::Schema => "schema",
        }
    }
}

impl SourcePipeline {
    pub fn projector(&self) -> RowProjector<'_> {
        RowProjector::new(&self.flatten, &self.rules, &self.schema)
    }

    /// Keys of `flat` that never reach a row, with the stage that dropped them.
    ///
    /// Rule drops report the flattened key, schema drops the canonical key.
    pub fn dropped_keys(&self, flat: &FlatRecord) -> Result<Vec<(DropStage, String)>> {
        let mut dropped = Vec::new();
        for key in flat.keys() {
            match self.rules.rewrite_key(key)? {
                None => dropped.push((DropStage::Rules, key.clone())),
                Some(canonical) if self.schema.position(&canonical).is_none() => {
                    dropped.push((DropStage::Schema, canonical))
                }
                Some(_) => {}
            }
        }
        Ok(dropped)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute the merge but leave the store file untouched
    pub dry_run: bool,
}

/// What an incremental run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub merge: MergeReport,
    pub skipped: Vec<SkippedRecord>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub written: bool,
}

/// Merge a fetched batch into the store at `store_path`.
///
/// The store is loaded (and its header checked) before any record is
/// projected, so a schema mismatch stops the run without touching the file.
/// The file is only rewritten when rows were appended or it did not exist.
pub fn run_incremental(
    store_path: &Path,
    records: Vec<RawValue>,
    pipeline: &SourcePipeline,
    options: RunOptions,
) -> Result<RunSummary> {
    let existed = store_path.exists();
    let existing = store::load(store_path, &pipeline.schema)?;
    let rows_before = existing.len();

    let batch = pipeline.projector().project_batch(records)?;
    let outcome = merge(existing, batch.rows)?;
    let report = outcome.report;
    let merged = outcome.into_merged();

    let should_write = !options.dry_run && (report.appended > 0 || !existed);
    if should_write {
        store::save(store_path, &merged)?;
    }

    info!(
        source = %pipeline.schema.source(),
        store = %store_path.display(),
        rows_before,
        rows_after = merged.len(),
        appended = report.appended,
        skipped = batch.skipped.len(),
        dry_run = options.dry_run,
        "incremental run finished"
    );

    Ok(RunSummary {
        merge: report,
        skipped: batch.skipped,
        rows_before,
        rows_after: merged.len(),
        written: should_write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use serde_json::json;

    fn pipeline() -> SourcePipeline {
        SourcePipeline {
            flatten: FlattenConfig::default(),
            rules: PrefixRules::new([("id", "id"), ("notes", "notes"), ("extra", "")]),
            schema: SchemaDefinition::new("unhcr", "id", vec!["id".to_string()]).unwrap(),
        }
    }

    #[test]
    fn test_dropped_keys_report_their_stage() {
        let pipeline = pipeline();
        let flat = flatten(
            &RawValue::from(json!({"id": 1, "notes": "n", "unmapped": {"a": "u"}})),
            &pipeline.flatten,
        );

        let dropped = pipeline.dropped_keys(&flat).unwrap();

        assert_eq!(
            dropped,
            vec![
                (DropStage::Schema, "notes".to_string()),
                (DropStage::Rules, "unmapped.a".to_string()),
            ]
        );
    }

    #[test]
    fn test_same_name_in_both_stages_is_reported_twice() {
        let pipeline = pipeline();
        // "extra.title" strips to "title", which is not a column; the raw
        // "title" matches no rule
        let flat = flatten(
            &RawValue::from(json!({"id": 1, "title": "t", "extra": {"title": "x"}})),
            &pipeline.flatten,
        );

        let mut dropped = pipeline.dropped_keys(&flat).unwrap();
        dropped.sort();

        assert_eq!(
            dropped,
            vec![
                (DropStage::Rules, "title".to_string()),
                (DropStage::Schema, "title".to_string()),
            ]
        );
    }
}
