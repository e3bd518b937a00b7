//! Schema discovery for legacy stores
//!
//! Stores written before the registry existed picked up pandas-style duplicate
//! columns (`notes`, `notes.1`, `notes.2`) whenever two sections shared a field
//! name. This module finds those groups, suggests canonical names for the
//! common cases and produces a column template for a human to curate.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

static DUPLICATE_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\.(\d+)$").unwrap()
});

/// Columns that share a base name once a numeric suffix is removed
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub base: String,
    /// The bare base column first (when present), then suffixes in numeric order
    pub variants: Vec<String>,
}

/// Header of a legacy CSV plus how many sampled rows fill each column
#[derive(Debug, Clone)]
pub struct HeaderProfile {
    pub columns: Vec<String>,
    pub non_null: Vec<usize>,
    pub rows_read: usize,
}

impl HeaderProfile {
    pub fn non_null_count(&self, column: &str) -> Option<usize> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.non_null.get(idx).copied()
    }
}

/// Read a CSV header and count non-empty fields over the first `sample_rows` rows
pub fn profile_csv(path: &Path, sample_rows: usize) -> Result<HeaderProfile> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut non_null = vec![0usize; columns.len()];
    let mut rows_read = 0usize;

    for record in reader.records() {
        if rows_read >= sample_rows {
            break;
        }
        let record = record?;
        for (idx, field) in record.iter().enumerate().take(columns.len()) {
            if !field.is_empty() {
                non_null[idx] += 1;
            }
        }
        rows_read += 1;
    }

    Ok(HeaderProfile {
        columns,
        non_null,
        rows_read,
    })
}

/// Split a column into its base name and numeric suffix, if it has one
fn split_suffix(column: &str) -> Option<(&str, u32)> {
    let caps = DUPLICATE_SUFFIX_REGEX.captures(column)?;
    let base = caps.get(1)?.as_str();
    let suffix = caps.get(2)?.as_str().parse().ok()?;
    Some((base, suffix))
}

/// Group suffixed columns under their base name, ordered by base
pub fn find_duplicate_groups(columns: &[String]) -> Vec<DuplicateGroup> {
    let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let mut suffixed: BTreeMap<&str, Vec<(u32, &str)>> = BTreeMap::new();

    for column in columns {
        if let Some((base, suffix)) = split_suffix(column) {
            suffixed.entry(base).or_default().push((suffix, column.as_str()));
        }
    }

    suffixed
        .into_iter()
        .map(|(base, mut variants)| {
            variants.sort_by_key(|(suffix, _)| *suffix);
            let mut names = Vec::with_capacity(variants.len() + 1);
            if present.contains(base) {
                names.push(base.to_string());
            }
            names.extend(variants.into_iter().map(|(_, name)| name.to_string()));
            DuplicateGroup {
                base: base.to_string(),
                variants: names,
            }
        })
        .collect()
}

/// Suggested canonical names for each variant of a group, or `None` when the
/// group needs manual review
pub fn suggest_canonical(group: &DuplicateGroup) -> Option<Vec<(String, String)>> {
    let base = group.base.as_str();
    let namespaces: &[&str] = if base.contains("version_statement") {
        &["study", "doc"]
    } else if base == "notes" {
        &["info", "method"]
    } else {
        return None;
    };

    Some(
        group
            .variants
            .iter()
            .enumerate()
            .map(|(idx, variant)| {
                let target = match namespaces.get(idx) {
                    Some(ns) => format!("{}.{}", ns, base),
                    None => format!("{}.{}", base, idx),
                };
                (variant.clone(), target)
            })
            .collect(),
    )
}

/// Sorted column template with suffixed duplicates folded into their base
pub fn schema_template(columns: &[String], identifier: &str) -> Value {
    let groups = find_duplicate_groups(columns);
    let grouped: HashSet<&str> = groups.iter().map(|g| g.base.as_str()).collect();

    let mut template: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|column| match split_suffix(column) {
            Some((base, _)) => !grouped.contains(base),
            None => true,
        })
        .collect();
    template.sort_unstable();
    template.dedup();

    // base names whose only occurrences carried a suffix still need a column
    for group in &groups {
        if !template.contains(&group.base.as_str()) {
            template.push(group.base.as_str());
        }
    }
    template.sort_unstable();

    json!({
        "identifier": identifier,
        "columns": template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_duplicate_groups() {
        let columns = cols(&[
            "id",
            "notes",
            "notes.2",
            "notes.1",
            "version_statement.version",
            "version_statement.version.1",
            "idno.1",
        ]);

        let groups = find_duplicate_groups(&columns);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].base, "idno");
        assert_eq!(groups[0].variants, vec!["idno.1"]);
        assert_eq!(groups[1].base, "notes");
        assert_eq!(groups[1].variants, vec!["notes", "notes.1", "notes.2"]);
        assert_eq!(groups[2].variants, vec!["version_statement.version", "version_statement.version.1"]);
    }

    #[test]
    fn test_suggestions() {
        let notes = DuplicateGroup {
            base: "notes".to_string(),
            variants: cols(&["notes", "notes.1", "notes.2"]),
        };
        let suggested = suggest_canonical(&notes).unwrap();
        assert_eq!(suggested[0], ("notes".to_string(), "info.notes".to_string()));
        assert_eq!(suggested[1], ("notes.1".to_string(), "method.notes".to_string()));
        assert_eq!(suggested[2], ("notes.2".to_string(), "notes.2".to_string()));

        let other = DuplicateGroup {
            base: "producers".to_string(),
            variants: cols(&["producers", "producers.1"]),
        };
        assert!(suggest_canonical(&other).is_none());
    }

    #[test]
    fn test_schema_template_folds_duplicates() {
        let columns = cols(&["title", "id", "notes", "notes.1", "idno.1"]);
        let template = schema_template(&columns, "id");

        assert_eq!(template["identifier"], "id");
        assert_eq!(template["columns"], json!(["id", "idno", "notes", "title"]));
    }

    #[test]
    fn test_profile_csv_counts_filled_fields() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "id,title,notes").unwrap();
        writeln!(file, "1,A,").unwrap();
        writeln!(file, "2,,x").unwrap();
        writeln!(file, "3,C,y").unwrap();
        file.flush().unwrap();

        let profile = profile_csv(file.path(), 2).unwrap();

        assert_eq!(profile.columns, cols(&["id", "title", "notes"]));
        assert_eq!(profile.rows_read, 2);
        assert_eq!(profile.non_null_count("id"), Some(2));
        assert_eq!(profile.non_null_count("title"), Some(1));
        assert_eq!(profile.non_null_count("notes"), Some(1));
    }
}
