use crate::flatten::value::{RawValue, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Flattened record: dotted path → scalar, `None` for null leaves.
///
/// Iteration is in ascending key order, which the prefix mapper relies on for
/// its collision policy.
pub type FlatRecord = BTreeMap<String, Option<Scalar>>;

/// How a sequence holding mappings or nested sequences is flattened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// One compact JSON string under the sequence's own path
    Serialize,
    /// One key per leaf under `path.index.*`
    Explode,
}

/// Configuration for the flattening process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Separator between path segments
    pub separator: String,

    /// Separator used when joining a sequence of scalars into one value
    pub list_separator: String,

    /// Policy for sequences of mappings when no override applies
    pub object_sequences: SequencePolicy,

    /// Per-field policy overrides, keyed by path without index segments
    pub sequence_overrides: HashMap<String, SequencePolicy>,

    /// Mappings nested deeper than this are kept as a JSON string
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            separator: String::from("."),
            list_separator: String::from(", "),
            object_sequences: SequencePolicy::Serialize,
            sequence_overrides: HashMap::new(),
            max_depth: 16,
        }
    }
}

impl FlattenConfig {
    /// Resolve the sequence policy for a flattened path.
    ///
    /// Numeric segments are ignored so that an override for `authors.affiliation`
    /// also applies to `authors.3.affiliation`.
    pub fn policy_for(&self, path: &str) -> SequencePolicy {
        if self.sequence_overrides.is_empty() {
            return self.object_sequences;
        }
        let normalized = path
            .split(self.separator.as_str())
            .filter(|segment| segment.parse::<usize>().is_err())
            .collect::<Vec<_>>()
            .join(&self.separator);
        self.sequence_overrides
            .get(&normalized)
            .copied()
            .unwrap_or(self.object_sequences)
    }
}

/// Walks a nested record depth-first and emits one key per leaf
pub struct Flattener<'a> {
    config: &'a FlattenConfig,
}

impl<'a> Flattener<'a> {
    pub fn new(config: &'a FlattenConfig) -> Self {
        Flattener { config }
    }

    /// Flatten a raw record into dotted-path keys
    pub fn flatten(&self, raw: &RawValue) -> FlatRecord {
        let mut out = FlatRecord::new();
        self.walk(raw, String::new(), 0, &mut out);
        out
    }

    fn walk(&self, value: &RawValue, path: String, depth: usize, out: &mut FlatRecord) {
        match value {
            RawValue::Null => {
                if !path.is_empty() {
                    out.insert(path, None);
                }
            }
            RawValue::Scalar(scalar) => {
                if !path.is_empty() {
                    out.insert(path, Some(scalar.clone()));
                }
            }
            RawValue::Mapping(entries) => {
                if entries.is_empty() {
                    return;
                }
                if depth > self.config.max_depth && !path.is_empty() {
                    out.insert(path, Some(serialize(value)));
                    return;
                }
                for (key, child) in entries {
                    self.walk(child, self.join(&path, key), depth + 1, out);
                }
            }
            RawValue::Sequence(items) => {
                if items.is_empty() {
                    return;
                }
                if items.iter().all(RawValue::is_leaf) {
                    self.join_scalars(items, path, out);
                    return;
                }
                match self.config.policy_for(&path) {
                    SequencePolicy::Serialize => {
                        if !path.is_empty() {
                            out.insert(path, Some(serialize(value)));
                        }
                    }
                    SequencePolicy::Explode => {
                        for (idx, child) in items.iter().enumerate() {
                            self.walk(child, self.join(&path, &idx.to_string()), depth + 1, out);
                        }
                    }
                }
            }
        }
    }

    /// Collapse a sequence of scalars into one string; nulls are skipped
    fn join_scalars(&self, items: &[RawValue], path: String, out: &mut FlatRecord) {
        let parts: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                RawValue::Scalar(s) => Some(s.render()),
                _ => None,
            })
            .collect();
        if parts.is_empty() || path.is_empty() {
            return;
        }
        out.insert(path, Some(Scalar::String(parts.join(&self.config.list_separator))));
    }

    fn join(&self, parent: &str, key: &str) -> String {
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", parent, self.config.separator, key)
        }
    }
}

fn serialize(value: &RawValue) -> Scalar {
    Scalar::String(Value::from(value).to_string())
}

/// Flatten with the given configuration
pub fn flatten(raw: &RawValue, config: &FlattenConfig) -> FlatRecord {
    Flattener::new(config).flatten(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat(value: serde_json::Value, config: &FlattenConfig) -> FlatRecord {
        flatten(&RawValue::from(value), config)
    }

    fn text(s: &str) -> Option<Scalar> {
        Some(Scalar::from(s))
    }

    #[test]
    fn test_nested_mappings_use_dotted_paths() {
        let record = flat(
            json!({
                "id": 12,
                "study_desc": {
                    "title_statement": {"title": "Household Survey"},
                    "version_statement": {"version": "1.0"}
                }
            }),
            &FlattenConfig::default(),
        );

        assert_eq!(record.len(), 3);
        assert_eq!(record["id"], Some(Scalar::from(12i64)));
        assert_eq!(record["study_desc.title_statement.title"], text("Household Survey"));
        assert_eq!(record["study_desc.version_statement.version"], text("1.0"));
    }

    #[test]
    fn test_scalar_sequence_is_joined() {
        let record = flat(
            json!({"study_info": {"keywords": ["refugees", null, "income", 2020]}}),
            &FlattenConfig::default(),
        );

        assert_eq!(record.len(), 1);
        assert_eq!(record["study_info.keywords"], text("refugees, income, 2020"));
    }

    #[test]
    fn test_empty_containers_produce_no_keys() {
        let record = flat(
            json!({"id": 1, "tags": [], "meta": {}, "nulls": [null, null]}),
            &FlattenConfig::default(),
        );

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_null_leaf_is_kept_as_null() {
        let record = flat(json!({"doc_desc": {"producers": null}}), &FlattenConfig::default());
        assert_eq!(record["doc_desc.producers"], None);
        assert!(record.contains_key("doc_desc.producers"));
    }

    #[test]
    fn test_object_sequence_serialized_by_default() {
        let record = flat(
            json!({"study_desc": {"authoring_entity": [{"name": "UNHCR"}, {"name": "WB"}]}}),
            &FlattenConfig::default(),
        );

        assert_eq!(
            record["study_desc.authoring_entity"],
            text(r#"[{"name":"UNHCR"},{"name":"WB"}]"#)
        );
    }

    #[test]
    fn test_object_sequence_override_explodes() {
        let mut config = FlattenConfig::default();
        config
            .sequence_overrides
            .insert("study_desc.authoring_entity".to_string(), SequencePolicy::Explode);

        let record = flat(
            json!({
                "study_desc": {
                    "authoring_entity": [{"name": "UNHCR"}, {"name": "WB", "affiliation": "IBRD"}],
                    "other": [{"x": 1}]
                }
            }),
            &config,
        );

        assert_eq!(record["study_desc.authoring_entity.0.name"], text("UNHCR"));
        assert_eq!(record["study_desc.authoring_entity.1.name"], text("WB"));
        assert_eq!(record["study_desc.authoring_entity.1.affiliation"], text("IBRD"));
        // Fields without an override keep the default
        assert_eq!(record["study_desc.other"], text(r#"[{"x":1}]"#));
    }

    #[test]
    fn test_override_ignores_index_segments() {
        let mut config = FlattenConfig::default();
        config.object_sequences = SequencePolicy::Explode;
        config
            .sequence_overrides
            .insert("series.sources".to_string(), SequencePolicy::Serialize);

        let record = flat(
            json!({"series": [{"sources": [{"name": "a"}]}]}),
            &config,
        );

        assert_eq!(record["series.0.sources"], text(r#"[{"name":"a"}]"#));
    }

    #[test]
    fn test_depth_limit_serializes_subtree() {
        let config = FlattenConfig {
            max_depth: 1,
            ..FlattenConfig::default()
        };

        let record = flat(json!({"a": {"b": {"c": {"d": 1}}}}), &config);

        assert_eq!(record.len(), 1);
        assert_eq!(record["a.b"], text(r#"{"c":{"d":1}}"#));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let input = json!({
            "id": "x",
            "method": {"notes": "n", "data_collection": {"sampling_procedure": "random"}},
            "list": [{"a": 1}, {"b": [1, 2]}]
        });
        let config = FlattenConfig::default();

        assert_eq!(flat(input.clone(), &config), flat(input, &config));
    }
}
