//! CSV persistence for one source's rows
//!
//! The header must equal the registry's column list, in order, before any row
//! is read. Saving rewrites the whole file through a temporary sibling that
//! is renamed over the target, so a failed save never leaves a half-written
//! store behind.

use crate::error::{HarvestError, Result};
use crate::flatten::Scalar;
use crate::schema::{Row, SchemaDefinition};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Ordered rows of one source, tied to the schema they were loaded with
#[derive(Debug, Clone)]
pub struct Store {
    schema: SchemaDefinition,
    path: PathBuf,
    rows: Vec<Row>,
}

impl Store {
    /// A store with no rows and no backing file yet
    pub fn empty(schema: SchemaDefinition) -> Self {
        Store {
            schema,
            path: PathBuf::new(),
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// File the store was loaded from; empty for in-memory stores
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add rows after the existing ones
    pub fn append(&mut self, rows: Vec<Row>) {
        self.rows.extend(rows);
    }
}

fn schema_format(path: &Path, schema: &SchemaDefinition, detail: String) -> HarvestError {
    HarvestError::SchemaFormat {
        path: path.to_path_buf(),
        source_name: schema.source().to_string(),
        detail,
    }
}

/// Describe how a header differs from the declared columns
fn header_mismatch(expected: &[String], found: &[String]) -> Option<String> {
    if expected == found {
        return None;
    }

    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let found_set: HashSet<&str> = found.iter().map(String::as_str).collect();
    let mut missing: Vec<&str> = expected_set.difference(&found_set).copied().collect();
    let mut extra: Vec<&str> = found_set.difference(&expected_set).copied().collect();
    missing.sort_unstable();
    extra.sort_unstable();

    let detail = if missing.is_empty() && extra.is_empty() {
        match expected.iter().zip(found).position(|(e, f)| e != f) {
            Some(idx) => format!(
                "column order differs at position {}: expected '{}' but found '{}'",
                idx + 1,
                expected[idx],
                found[idx]
            ),
            None => format!(
                "header has {} column(s), schema declares {}",
                found.len(),
                expected.len()
            ),
        }
    } else {
        format!("missing columns {:?}, unexpected columns {:?}", missing, extra)
    };
    Some(detail)
}

/// Load a store, checking its header against `schema`.
///
/// A file that does not exist yet loads as an empty store.
pub fn load(path: &Path, schema: &SchemaDefinition) -> Result<Store> {
    if !path.exists() {
        info!(path = %path.display(), source = %schema.source(), "store does not exist yet, starting empty");
        return Ok(Store {
            schema: schema.clone(),
            path: path.to_path_buf(),
            rows: Vec::new(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if let Some(detail) = header_mismatch(schema.columns(), &header) {
        return Err(schema_format(path, schema, detail));
    }

    let id_index = schema.identifier_index();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                if let csv::ErrorKind::UnequalLengths { pos, expected_len, len } = err.kind() {
                    let line = pos.as_ref().map(|p| p.line()).unwrap_or_default();
                    return Err(schema_format(
                        path,
                        schema,
                        format!("line {} has {} field(s), header has {}", line, len, expected_len),
                    ));
                }
                return Err(err.into());
            }
        };

        let values: Vec<Option<Scalar>> = record
            .iter()
            .map(|field| (!field.is_empty()).then(|| Scalar::String(field.to_string())))
            .collect();

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let id = match &values[id_index] {
            Some(id) => id.render(),
            None => {
                return Err(HarvestError::StoreIntegrity {
                    path: path.to_path_buf(),
                    identifier: schema.identifier().to_string(),
                    detail: format!("line {} has no identifier", line),
                })
            }
        };
        if !seen.insert(id.clone()) {
            return Err(HarvestError::StoreIntegrity {
                path: path.to_path_buf(),
                identifier: schema.identifier().to_string(),
                detail: format!("identifier '{}' repeats on line {}", id, line),
            });
        }

        rows.push(schema.row_from_values(values)?);
    }

    debug!(path = %path.display(), rows = rows.len(), "loaded store");
    Ok(Store {
        schema: schema.clone(),
        path: path.to_path_buf(),
        rows,
    })
}

/// Write header and rows, replacing `path` atomically
pub fn save(path: &Path, store: &Store) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(store.schema().columns())?;
        for row in store.rows() {
            writer.write_record(row.values().iter().map(|value| match value {
                Some(scalar) => scalar.render(),
                None => String::new(),
            }))?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    // on failure the temp file is deleted when the returned handle drops
    tmp.persist(path).map_err(|err| HarvestError::Io(err.error))?;

    info!(path = %path.display(), rows = store.len(), "saved store");
    Ok(())
}
