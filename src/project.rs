//! Row projection: flatten, remap, then fit onto the registry's columns
//!
//! The projector holds no state of its own; it exists so the flattener, the
//! prefix table and the schema can each be swapped or tested on their own.

use crate::error::{HarvestError, Result};
use crate::flatten::{FlattenConfig, Flattener, RawValue};
use crate::prefix::PrefixRules;
use crate::schema::{Row, SchemaDefinition};
use tracing::{debug, warn};

/// A record that was left out of a batch, by position in the input
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

/// Rows built from a batch, plus the records that could not be projected
#[derive(Debug, Default)]
pub struct ProjectedBatch {
    pub rows: Vec<Row>,
    pub skipped: Vec<SkippedRecord>,
}

impl ProjectedBatch {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

pub struct RowProjector<'a> {
    flatten: &'a FlattenConfig,
    rules: &'a PrefixRules,
    schema: &'a SchemaDefinition,
}

impl<'a> RowProjector<'a> {
    pub fn new(
        flatten: &'a FlattenConfig,
        rules: &'a PrefixRules,
        schema: &'a SchemaDefinition,
    ) -> Self {
        RowProjector {
            flatten,
            rules,
            schema,
        }
    }

    /// Build one row from a raw record.
    ///
    /// Fails with `MalformedRecord` when the record is not a mapping or has no
    /// usable identifier, and with `AmbiguousPrefixMapping` from a strict table.
    pub fn build_row(&self, raw: &RawValue) -> Result<Row> {
        if !raw.is_mapping() {
            return Err(HarvestError::MalformedRecord(
                "record root is not a mapping".to_string(),
            ));
        }

        let flat = Flattener::new(self.flatten).flatten(raw);
        let canonical = self.rules.remap(flat)?;
        let row = self.schema.project(&canonical);

        let has_identifier = row
            .value_at(self.schema.identifier_index())
            .map(|id| !id.render().is_empty())
            .unwrap_or(false);
        if !has_identifier {
            return Err(HarvestError::MalformedRecord(format!(
                "identifier '{}' is missing, null or empty",
                self.schema.identifier()
            )));
        }

        Ok(row)
    }

    /// Project a whole batch, skipping malformed records.
    ///
    /// Any other error aborts the batch.
    pub fn project_batch<I>(&self, records: I) -> Result<ProjectedBatch>
    where
        I: IntoIterator<Item = RawValue>,
    {
        let mut batch = ProjectedBatch::default();

        for (index, raw) in records.into_iter().enumerate() {
            match self.build_row(&raw) {
                Ok(row) => batch.rows.push(row),
                Err(HarvestError::MalformedRecord(reason)) => {
                    warn!(source = %self.schema.source(), index, %reason, "skipping malformed record");
                    batch.skipped.push(SkippedRecord { index, reason });
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            source = %self.schema.source(),
            rows = batch.rows.len(),
            skipped = batch.skipped.len(),
            "projected batch"
        );
        Ok(batch)
    }
}

/// `schema.project(remap(flatten(raw), rules))`
pub fn build_row(
    raw: &RawValue,
    flatten: &FlattenConfig,
    rules: &PrefixRules,
    schema: &SchemaDefinition,
) -> Result<Row> {
    RowProjector::new(flatten, rules, schema).build_row(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::Scalar;
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new(
            "worldbank",
            "id",
            vec![
                "id".to_string(),
                "title".to_string(),
                "study.version_statement.version".to_string(),
                "doc.version_statement.version".to_string(),
                "method.sampling_procedure".to_string(),
            ],
        )
        .unwrap()
    }

    fn rules() -> PrefixRules {
        PrefixRules::new([
            ("id", "id"),
            ("title", "title"),
            ("study_desc", "study"),
            ("doc_desc", "doc"),
            ("data_collection", "method"),
        ])
    }

    #[test]
    fn test_build_row_end_to_end() {
        let raw = RawValue::from(json!({
            "id": 9,
            "title": "Labour Force Survey",
            "study_desc": {"version_statement": {"version": "2.1"}, "keywords": ["a", "b"]},
            "doc_desc": {"version_statement": {"version": "1.0"}},
            "data_collection": {"sampling_procedure": "stratified"},
            "schematype": "survey"
        }));

        let row = build_row(&raw, &FlattenConfig::default(), &rules(), &schema()).unwrap();

        assert_eq!(row.get("id"), Some(&Scalar::from(9i64)));
        assert_eq!(row.get("study.version_statement.version"), Some(&Scalar::from("2.1")));
        assert_eq!(row.get("doc.version_statement.version"), Some(&Scalar::from("1.0")));
        assert_eq!(row.get("method.sampling_procedure"), Some(&Scalar::from("stratified")));
        assert_eq!(row.values().len(), 5);
    }

    #[test]
    fn test_unknown_fields_never_reach_the_row() {
        let raw = RawValue::from(json!({
            "id": "a1",
            "unexpected": {"deep": "value"},
            "study_desc": {"brand_new_field": "x"}
        }));

        let row = build_row(&raw, &FlattenConfig::default(), &rules(), &schema()).unwrap();

        let filled: Vec<&str> = row
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(column, _)| column)
            .collect();
        assert_eq!(filled, vec!["id"]);
        assert_eq!(row.columns(), schema().columns());
    }

    #[test]
    fn test_batch_skips_malformed_records() {
        let flatten = FlattenConfig::default();
        let rules = rules();
        let schema = schema();
        let projector = RowProjector::new(&flatten, &rules, &schema);

        let batch = projector
            .project_batch(vec![
                RawValue::from(json!({"id": 1, "title": "ok"})),
                RawValue::from(json!(["not", "a", "mapping"])),
                RawValue::from(json!({"title": "no id"})),
                RawValue::from(json!({"id": {"nested": 1}})),
                RawValue::from(json!({"id": ""})),
                RawValue::from(json!({"id": 2})),
            ])
            .unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.skipped_count(), 4);
        assert_eq!(
            batch.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_batch_propagates_ambiguous_mapping() {
        let flatten = FlattenConfig::default();
        let rules = PrefixRules::new([("id", "id"), ("id", "dataset_id")]).strict(true);
        let schema = schema();
        let projector = RowProjector::new(&flatten, &rules, &schema);

        let err = projector
            .project_batch(vec![RawValue::from(json!({"id": 1}))])
            .unwrap_err();

        assert!(matches!(err, HarvestError::AmbiguousPrefixMapping { .. }));
    }
}
