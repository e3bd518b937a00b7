//! Prefix rewriting of flattened keys into canonical namespaces
//!
//! Each source nests the same field names under different sections
//! (`study_desc.version_statement.version` vs `doc_desc.version_statement.version`).
//! A [`PrefixRules`] table collapses those sections into canonical namespaces
//! (`study.`, `doc.`, `info.`, `method.`) so same-named fields never collide.

use crate::error::{HarvestError, Result};
use crate::flatten::{FlatRecord, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Flattened record whose keys have been rewritten by a rule table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRecord(BTreeMap<String, Option<Scalar>>);

impl CanonicalRecord {
    pub fn new() -> Self {
        CanonicalRecord(BTreeMap::new())
    }

    /// Value for a canonical key: `None` if absent, `Some(None)` if null
    pub fn get(&self, key: &str) -> Option<&Option<Scalar>> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: String, value: Option<Scalar>) -> Option<Option<Scalar>> {
        self.0.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Scalar>)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Option<Scalar>)> for CanonicalRecord {
    fn from_iter<I: IntoIterator<Item = (String, Option<Scalar>)>>(iter: I) -> Self {
        CanonicalRecord(iter.into_iter().collect())
    }
}

/// One rewrite: keys under `raw` are moved under `canonical`.
///
/// An empty `raw` matches every key; an empty `canonical` strips the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub raw: String,
    pub canonical: String,
}

/// Ordered rewrite table, evaluated longest raw prefix first
#[derive(Debug, Clone)]
pub struct PrefixRules {
    rules: Vec<PrefixRule>,
    separator: String,
    strict: bool,
}

impl PrefixRules {
    /// Build a table from `(raw_prefix, canonical_prefix)` pairs.
    ///
    /// Trailing separators are trimmed, so `"study_desc."` and `"study_desc"`
    /// are the same rule. Rules of equal length keep their declared order.
    pub fn new<I, R, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: Into<String>,
        C: Into<String>,
    {
        Self::with_separator(pairs, ".")
    }

    pub fn with_separator<I, R, C>(pairs: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: Into<String>,
        C: Into<String>,
    {
        let trim = |s: String| s.trim_end_matches(separator).to_string();
        let mut rules: Vec<PrefixRule> = pairs
            .into_iter()
            .map(|(raw, canonical)| PrefixRule {
                raw: trim(raw.into()),
                canonical: trim(canonical.into()),
            })
            .collect();
        // stable: declaration order survives among equal lengths
        rules.sort_by(|a, b| b.raw.len().cmp(&a.raw.len()));

        PrefixRules {
            rules,
            separator: separator.to_string(),
            strict: false,
        }
    }

    /// Fail on equally specific rules with different targets instead of
    /// taking the first declared one.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[PrefixRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite a single key, or `None` if it is out of schema.
    pub fn rewrite_key(&self, key: &str) -> Result<Option<String>> {
        let mut matching = self.rules.iter().filter(|rule| self.matches(rule, key));
        let Some(rule) = matching.next() else {
            return Ok(None);
        };

        if self.strict {
            if let Some(other) = matching
                .take_while(|other| other.raw.len() == rule.raw.len())
                .find(|other| other.canonical != rule.canonical)
            {
                return Err(HarvestError::AmbiguousPrefixMapping {
                    key: key.to_string(),
                    raw_prefix: rule.raw.clone(),
                    first: rule.canonical.clone(),
                    second: other.canonical.clone(),
                });
            }
        }

        Ok(self.apply(rule, key))
    }

    /// Rewrite every key of a flat record.
    ///
    /// Keys are visited in ascending order of their original path; when two
    /// keys land on the same canonical key the later one wins.
    pub fn remap(&self, flat: FlatRecord) -> Result<CanonicalRecord> {
        let mut out = CanonicalRecord::new();
        let mut dropped = 0usize;

        for (key, value) in flat {
            match self.rewrite_key(&key)? {
                Some(canonical) => {
                    if out.contains_key(&canonical) {
                        debug!(original = %key, canonical = %canonical, "canonical key collision, later key wins");
                    }
                    out.insert(canonical, value);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(kept = out.len(), dropped, "remapped flat record");
        }
        Ok(out)
    }

    fn matches(&self, rule: &PrefixRule, key: &str) -> bool {
        if rule.raw.is_empty() {
            return true;
        }
        match key.strip_prefix(rule.raw.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(self.separator.as_str()),
            None => false,
        }
    }

    fn apply(&self, rule: &PrefixRule, key: &str) -> Option<String> {
        let rest = if rule.raw.is_empty() {
            key
        } else {
            // exactly one separator; `matches` guarantees it is there
            key[rule.raw.len()..]
                .strip_prefix(self.separator.as_str())
                .unwrap_or_default()
        };

        let rewritten = match (rule.canonical.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => rule.canonical.clone(),
            (false, false) => format!("{}{}{}", rule.canonical, self.separator, rest),
        };
        (!rewritten.is_empty()).then_some(rewritten)
    }
}

/// Rewrite a flat record with the given table
pub fn remap(flat: FlatRecord, rules: &PrefixRules) -> Result<CanonicalRecord> {
    rules.remap(flat)
}
