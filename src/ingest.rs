//! Reading fetched record batches
//!
//! A batch arrives as whatever the fetch step wrote: a JSON array, a single
//! JSON document (possibly an API envelope such as `{"result": {"rows": [...]}}`)
//! or newline-delimited JSON.

use crate::error::{HarvestError, Result};
use crate::flatten::RawValue;
use serde_json::Value;
use std::io::{BufReader, Read};
use tracing::debug;

/// How to turn raw input into records
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Treat the input as one JSON document per line
    pub ndjson: bool,

    /// JSON pointer to the record list inside each document, e.g. `/result/rows`
    pub records_pointer: Option<String>,

    /// Copy the value at this pointer into `identifier` when a record lacks it
    pub identifier_from: Option<String>,

    /// Keep only records whose `created` field mentions this year
    pub created_year: Option<i32>,
}

/// Read every top-level JSON document from `reader`.
///
/// Uses SIMD parsing for a single document and falls back to line-by-line
/// parsing when the input is not one valid document. Input that is not valid
/// UTF-8 is rejected before either parse.
pub fn read_documents<R: Read>(reader: R, ndjson: bool) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    BufReader::new(reader).read_to_end(&mut content)?;
    let text = String::from_utf8(content).map_err(|e| {
        HarvestError::Input(format!(
            "invalid UTF-8 at byte {}",
            e.utf8_error().valid_up_to()
        ))
    })?;

    if !ndjson {
        let mut scratch = text.as_bytes().to_vec();
        if let Ok(doc) = simd_json::to_owned_value(&mut scratch) {
            let json_str = simd_json::to_string(&doc)
                .map_err(|e| HarvestError::Input(format!("failed to re-encode document: {}", e)))?;
            return Ok(vec![serde_json::from_str(&json_str)?]);
        }
        debug!("input is not a single JSON document, reading as NDJSON");
    }

    let mut documents = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            HarvestError::Input(format!("line {}: {}", line_no + 1, e))
        })?;
        documents.push(value);
    }
    Ok(documents)
}

/// Unwrap documents into individual records.
///
/// Arrays contribute their elements; anything else is one record.
pub fn select_records(documents: Vec<Value>, pointer: Option<&str>) -> Result<Vec<Value>> {
    let mut records = Vec::new();

    for mut doc in documents {
        let target = match pointer {
            Some(p) => doc
                .pointer_mut(p)
                .map(Value::take)
                .ok_or_else(|| HarvestError::Input(format!("pointer '{}' not found in document", p)))?,
            None => doc,
        };
        match target {
            Value::Array(items) => records.extend(items),
            other => records.push(other),
        }
    }

    Ok(records)
}

/// Fill `identifier` from the value at `pointer` where it is missing or null
pub fn fill_identifier(record: &mut Value, identifier: &str, pointer: &str) {
    let missing = record.get(identifier).map(Value::is_null).unwrap_or(true);
    if !missing {
        return;
    }
    let Some(found) = record.pointer(pointer).cloned() else {
        return;
    };
    if let Value::Object(obj) = record {
        obj.insert(identifier.to_string(), found);
    }
}

/// Keep records whose `created` value mentions `year`
pub fn filter_by_year(records: Vec<Value>, field: &str, year: i32) -> Vec<Value> {
    let needle = year.to_string();
    records
        .into_iter()
        .filter(|record| match record.get(field) {
            Some(Value::String(s)) => s.contains(&needle),
            Some(Value::Null) | None => false,
            Some(other) => other.to_string().contains(&needle),
        })
        .collect()
}

/// Read a batch and apply `options`, producing records ready for projection
pub fn read_records<R: Read>(
    reader: R,
    identifier: &str,
    options: &IngestOptions,
) -> Result<Vec<RawValue>> {
    let documents = read_documents(reader, options.ndjson)?;
    let mut records = select_records(documents, options.records_pointer.as_deref())?;

    if let Some(year) = options.created_year {
        let before = records.len();
        records = filter_by_year(records, "created", year);
        debug!(year, before, after = records.len(), "filtered records by creation year");
    }

    if let Some(pointer) = options.identifier_from.as_deref() {
        for record in records.iter_mut() {
            fill_identifier(record, identifier, pointer);
        }
    }

    Ok(records.into_iter().map(RawValue::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_array_document() {
        let input = br#"[{"id": 1}, {"id": 2}]"#;
        let records = read_records(&input[..], "id", &IngestOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_reads_ndjson_with_blank_lines() {
        let input = b"{\"id\": 1}\n\n{\"id\": 2}\n{\"id\": 3}\n";
        let docs = read_documents(&input[..], true).unwrap();
        assert_eq!(docs.len(), 3);

        // without the flag the SIMD parse fails and NDJSON is used anyway
        let docs = read_documents(&input[..], false).unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_bad_ndjson_line_reports_position() {
        let input = b"{\"id\": 1}\n{broken\n";
        let err = read_documents(&input[..], true).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let input = b"{\"id\": 1, \"title\": \"caf\xe9\"}\n";

        for ndjson in [false, true] {
            let err = read_documents(&input[..], ndjson).unwrap_err();
            assert!(matches!(err, HarvestError::Input(_)));
            assert!(err.to_string().contains("byte 23"), "{}", err);
        }

        let err = read_records(&input[..], "id", &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, HarvestError::Input(_)));
    }

    #[test]
    fn test_envelope_pointer() {
        let doc = json!({"result": {"rows": [{"id": 1}, {"id": 2}], "total": 2}});
        let records = select_records(vec![doc.clone()], Some("/result/rows")).unwrap();
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);

        assert!(select_records(vec![doc], Some("/result/missing")).is_err());
    }

    #[test]
    fn test_fill_identifier_only_when_missing() {
        let mut exported = json!({"doc_desc": {"idno": "UNHCR_ETH_2023"}});
        fill_identifier(&mut exported, "id", "/doc_desc/idno");
        assert_eq!(exported["id"], "UNHCR_ETH_2023");

        let mut listed = json!({"id": 77, "doc_desc": {"idno": "X"}});
        fill_identifier(&mut listed, "id", "/doc_desc/idno");
        assert_eq!(listed["id"], 77);
    }

    #[test]
    fn test_filter_by_year() {
        let records = vec![
            json!({"id": 1, "created": "Nov-13-2025"}),
            json!({"id": 2, "created": "Jan-02-2024"}),
            json!({"id": 3}),
        ];

        let kept = filter_by_year(records, "created", 2025);
        assert_eq!(kept, vec![json!({"id": 1, "created": "Nov-13-2025"})]);
    }
}
