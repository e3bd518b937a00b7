use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A leaf value carried through flattening, projection and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Text form used for CSV fields, list joining and identifier comparison.
    pub fn render(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// One nested record as returned by a catalog source.
///
/// Mappings keep the order in which their entries were supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Mapping(Vec<(String, RawValue)>),
    Sequence(Vec<RawValue>),
    Scalar(Scalar),
    Null,
}

impl RawValue {
    pub fn is_mapping(&self) -> bool {
        matches!(self, RawValue::Mapping(_))
    }

    /// True for values that become a single flat cell (scalars and null).
    pub fn is_leaf(&self) -> bool {
        matches!(self, RawValue::Scalar(_) | RawValue::Null)
    }

    /// Look up a direct child of a mapping.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            RawValue::Mapping(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Set a direct child of a mapping, replacing an existing entry.
    ///
    /// Returns false when `self` is not a mapping.
    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) -> bool {
        let RawValue::Mapping(entries) = self else {
            return false;
        };
        let key = key.into();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
        true
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => RawValue::Scalar(Scalar::Number(n)),
            Value::String(s) => RawValue::Scalar(Scalar::String(s)),
            Value::Array(arr) => RawValue::Sequence(arr.into_iter().map(RawValue::from).collect()),
            Value::Object(obj) => RawValue::Mapping(
                obj.into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&RawValue> for Value {
    fn from(value: &RawValue) -> Self {
        match value {
            RawValue::Null => Value::Null,
            RawValue::Scalar(s) => s.clone().into(),
            RawValue::Sequence(items) => Value::Array(items.iter().map(Value::from).collect()),
            RawValue::Mapping(entries) => {
                let mut obj = Map::new();
                for (k, v) in entries {
                    obj.insert(k.clone(), Value::from(v));
                }
                Value::Object(obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_types() {
        let raw = RawValue::from(json!({"id": 7, "title": "Survey", "public": true, "notes": null}));

        assert_eq!(raw.get("id"), Some(&RawValue::Scalar(Scalar::from(7i64))));
        assert_eq!(raw.get("title"), Some(&RawValue::Scalar(Scalar::from("Survey"))));
        assert_eq!(raw.get("public"), Some(&RawValue::Scalar(Scalar::Bool(true))));
        assert_eq!(raw.get("notes"), Some(&RawValue::Null));
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let mut raw = RawValue::from(json!({"id": 1}));
        assert!(raw.insert("id", RawValue::Scalar(Scalar::from("abc"))));
        assert_eq!(raw.get("id"), Some(&RawValue::Scalar(Scalar::from("abc"))));

        let mut seq = RawValue::Sequence(vec![]);
        assert!(!seq.insert("id", RawValue::Null));
    }

    #[test]
    fn test_render_numbers_and_bools() {
        assert_eq!(Scalar::from(42i64).render(), "42");
        assert_eq!(Scalar::Bool(false).render(), "false");
        let float: Scalar = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(float.render(), "1.5");
    }
}
