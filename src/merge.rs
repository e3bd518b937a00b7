//! Incremental merge engine
//!
//! A store records the first-seen state of each dataset. Merging a freshly
//! projected batch only ever yields rows for identifiers the store has not
//! seen; rows already persisted are never compared or rewritten, even when
//! the source has since changed them.

use crate::error::{HarvestError, Result};
use crate::schema::Row;
use crate::store::Store;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Counts describing one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub existing: usize,
    pub incoming: usize,
    /// Incoming rows whose identifier was already stored
    pub already_stored: usize,
    /// Incoming rows repeating an identifier seen earlier in the same batch
    pub duplicate_in_batch: usize,
    /// Incoming rows without an identifier
    pub missing_identifier: usize,
    pub appended: usize,
}

/// The untouched store and the rows to append to it
#[derive(Debug)]
pub struct MergeOutcome {
    pub store: Store,
    pub appended: Vec<Row>,
    pub report: MergeReport,
}

impl MergeOutcome {
    /// Store with the appended rows added at the end
    pub fn into_merged(self) -> Store {
        let mut store = self.store;
        store.append(self.appended);
        store
    }
}

/// Compute which incoming rows are new to `existing`.
///
/// Identifiers compare by rendered text, so a fetched number `42` matches a
/// stored `"42"`. Among incoming duplicates only the first occurrence survives.
/// Rows built for a different column list fail with `SchemaFormat`.
pub fn merge(existing: Store, incoming: Vec<Row>) -> Result<MergeOutcome> {
    let schema = existing.schema();
    let id_index = schema.identifier_index();

    if let Some(foreign) = incoming.iter().find(|row| !schema.owns(row)) {
        return Err(HarvestError::SchemaFormat {
            path: existing.path().to_path_buf(),
            source_name: schema.source().to_string(),
            detail: format!(
                "incoming row has columns {:?}, store expects {:?}",
                foreign.columns(),
                schema.columns()
            ),
        });
    }

    let mut seen: HashSet<String> = existing
        .rows()
        .iter()
        .filter_map(|row| row.value_at(id_index).map(|id| id.render()))
        .collect();
    let stored: HashSet<String> = seen.clone();

    let mut report = MergeReport {
        existing: existing.len(),
        incoming: incoming.len(),
        ..MergeReport::default()
    };
    let mut appended = Vec::new();

    for row in incoming {
        let Some(id) = row.value_at(id_index).map(|id| id.render()) else {
            warn!(source = %schema.source(), "dropping incoming row without identifier");
            report.missing_identifier += 1;
            continue;
        };

        if seen.insert(id.clone()) {
            appended.push(row);
        } else if stored.contains(&id) {
            report.already_stored += 1;
        } else {
            debug!(source = %schema.source(), %id, "duplicate identifier in batch, keeping first");
            report.duplicate_in_batch += 1;
        }
    }

    report.appended = appended.len();
    info!(
        source = %schema.source(),
        existing = report.existing,
        incoming = report.incoming,
        already_stored = report.already_stored,
        duplicate_in_batch = report.duplicate_in_batch,
        appended = report.appended,
        "merged batch"
    );

    Ok(MergeOutcome {
        store: existing,
        appended,
        report,
    })
}
