use crate::error::{HarvestError, Result};
use crate::flatten::Scalar;
use crate::prefix::CanonicalRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Fixed, ordered column set for one source's store.
///
/// Cloning is cheap; the column list is shared with every [`Row`] projected
/// from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    source: String,
    identifier: String,
    identifier_index: usize,
    columns: Arc<[String]>,
    positions: HashMap<String, usize>,
}

impl SchemaDefinition {
    /// Validate and build a schema.
    ///
    /// Columns must be non-empty and unique, and must include the identifier.
    pub fn new(
        source: impl Into<String>,
        identifier: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<Self> {
        let source = source.into();
        let identifier = identifier.into();

        if columns.is_empty() {
            return Err(HarvestError::Configuration(format!(
                "source '{}' declares no columns",
                source
            )));
        }

        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(HarvestError::Configuration(format!(
                    "source '{}' declares an empty column name at position {}",
                    source,
                    idx + 1
                )));
            }
            if positions.insert(column.clone(), idx).is_some() {
                return Err(HarvestError::Configuration(format!(
                    "source '{}' declares column '{}' more than once",
                    source, column
                )));
            }
        }

        let identifier_index = *positions.get(&identifier).ok_or_else(|| {
            HarvestError::Configuration(format!(
                "identifier '{}' is not a declared column of source '{}'",
                identifier, source
            ))
        })?;

        Ok(SchemaDefinition {
            source,
            identifier,
            identifier_index,
            columns: columns.into(),
            positions,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the column that identifies a dataset
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn identifier_index(&self) -> usize {
        self.identifier_index
    }

    /// Declared column names, in store order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Project a canonical record onto the declared columns.
    ///
    /// Declared columns missing from the record become null; undeclared keys
    /// are dropped.
    pub fn project(&self, canonical: &CanonicalRecord) -> Row {
        let values = self
            .columns
            .iter()
            .map(|column| canonical.get(column).cloned().flatten())
            .collect();

        let undeclared = canonical
            .keys()
            .filter(|key| !self.positions.contains_key(*key))
            .count();
        if undeclared > 0 {
            debug!(source = %self.source, undeclared, "dropped undeclared canonical keys");
        }

        Row::from_parts(Arc::clone(&self.columns), values)
    }

    /// Build a row from already ordered values, e.g. a stored CSV line
    pub fn row_from_values(&self, values: Vec<Option<Scalar>>) -> Result<Row> {
        if values.len() != self.columns.len() {
            return Err(HarvestError::Configuration(format!(
                "row has {} values but source '{}' declares {} columns",
                values.len(),
                self.source,
                self.columns.len()
            )));
        }
        Ok(Row::from_parts(Arc::clone(&self.columns), values))
    }

    /// True when `row` was built for exactly this column list
    pub fn owns(&self, row: &Row) -> bool {
        Arc::ptr_eq(&self.columns, &row.columns) || *self.columns == *row.columns
    }
}

/// One store line: exactly the schema's columns, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<Scalar>>,
}

impl Row {
    fn from_parts(columns: Arc<[String]>, values: Vec<Option<Scalar>>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Row { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<Scalar>] {
        &self.values
    }

    /// Non-null value of a column; `None` for null or undeclared columns
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values[idx].as_ref()
    }

    pub fn value_at(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Scalar>)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_ref))
    }
}

/// Schemas of every configured source, keyed by source name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, SchemaDefinition>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: SchemaDefinition) -> Result<()> {
        if self.schemas.contains_key(schema.source()) {
            return Err(HarvestError::Configuration(format!(
                "source '{}' is registered twice",
                schema.source()
            )));
        }
        self.schemas.insert(schema.source().to_string(), schema);
        Ok(())
    }

    pub fn get(&self, source: &str) -> Result<&SchemaDefinition> {
        self.schemas
            .get(source)
            .ok_or_else(|| HarvestError::UnknownSource(source.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
