//! Schema drift detection
//!
//! Compares an observed schema against the last recorded schema for a dataset
//! and classifies the difference. Classification only: whether drift passes or
//! fails an ingestion is the quality validator's call, driven by the
//! contract's drift policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::ObservedSchema;
use crate::tabular::LogicalType;

/// Whether anything changed relative to the previous schema.
///
/// The first observation of a dataset establishes the baseline and is `None`,
/// not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    None,
    Drift,
}

/// A column whose inferred type changed between observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    pub from: LogicalType,
    pub to: LogicalType,
}

/// Classification of an observed schema against the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    #[serde(rename = "type")]
    pub kind: DriftKind,
    /// True iff a column was removed or changed type. Additive-only drift is
    /// non-breaking.
    pub breaking: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed_type: BTreeMap<String, TypeChange>,
}

impl DriftReport {
    /// The no-drift report, also used for the baseline observation.
    pub fn none() -> Self {
        Self {
            kind: DriftKind::None,
            breaking: false,
            added: Vec::new(),
            removed: Vec::new(),
            changed_type: BTreeMap::new(),
        }
    }

    pub fn is_drift(&self) -> bool {
        self.kind == DriftKind::Drift
    }
}

/// Classify the difference between the previous and current schema.
pub fn detect(previous: Option<&ObservedSchema>, current: &ObservedSchema) -> DriftReport {
    let Some(previous) = previous else {
        return DriftReport::none();
    };

    let prev: BTreeMap<&str, LogicalType> = previous
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.logical_type))
        .collect();
    let cur: BTreeMap<&str, LogicalType> = current
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.logical_type))
        .collect();

    let added: Vec<String> = cur
        .keys()
        .filter(|name| !prev.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let removed: Vec<String> = prev
        .keys()
        .filter(|name| !cur.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let changed_type: BTreeMap<String, TypeChange> = cur
        .iter()
        .filter_map(|(name, to)| {
            let from = *prev.get(name)?;
            (from != *to).then(|| (name.to_string(), TypeChange { from, to: *to }))
        })
        .collect();

    if added.is_empty() && removed.is_empty() && changed_type.is_empty() {
        return DriftReport::none();
    }

    DriftReport {
        kind: DriftKind::Drift,
        breaking: !removed.is_empty() || !changed_type.is_empty(),
        added,
        removed,
        changed_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;

    fn schema(cols: &[(&str, LogicalType)]) -> ObservedSchema {
        ObservedSchema::new(
            cols.iter()
                .map(|(name, ty)| ColumnSchema { name: name.to_string(), logical_type: *ty })
                .collect(),
        )
    }

    #[test]
    fn test_first_observation_is_not_drift() {
        let current = schema(&[("a", LogicalType::Number)]);
        let report = detect(None, &current);
        assert_eq!(report.kind, DriftKind::None);
        assert!(!report.breaking);
    }

    #[test]
    fn test_identical_schemas_are_not_drift() {
        let prev = schema(&[("a", LogicalType::Number), ("b", LogicalType::String)]);
        let report = detect(Some(&prev), &prev.clone());
        assert_eq!(report.kind, DriftKind::None);
    }

    #[test]
    fn test_added_column_is_non_breaking_drift() {
        let prev = schema(&[("a", LogicalType::Number), ("b", LogicalType::String)]);
        let cur = schema(&[
            ("a", LogicalType::Number),
            ("b", LogicalType::String),
            ("c", LogicalType::String),
        ]);

        let report = detect(Some(&prev), &cur);
        assert_eq!(report.kind, DriftKind::Drift);
        assert!(!report.breaking);
        assert_eq!(report.added, vec!["c".to_string()]);
        assert!(report.removed.is_empty());
        assert!(report.changed_type.is_empty());
    }

    #[test]
    fn test_type_change_is_breaking() {
        let prev = schema(&[("a", LogicalType::Number), ("b", LogicalType::String)]);
        let cur = schema(&[("a", LogicalType::String), ("b", LogicalType::String)]);

        let report = detect(Some(&prev), &cur);
        assert_eq!(report.kind, DriftKind::Drift);
        assert!(report.breaking);
        let change = &report.changed_type["a"];
        assert_eq!(change.from, LogicalType::Number);
        assert_eq!(change.to, LogicalType::String);
    }

    #[test]
    fn test_removed_column_is_breaking() {
        let prev = schema(&[("a", LogicalType::Number), ("b", LogicalType::String)]);
        let cur = schema(&[("a", LogicalType::Number)]);

        let report = detect(Some(&prev), &cur);
        assert!(report.breaking);
        assert_eq!(report.removed, vec!["b".to_string()]);
    }

    #[test]
    fn test_added_and_removed_together() {
        let prev = schema(&[("a", LogicalType::Number)]);
        let cur = schema(&[("b", LogicalType::Number)]);

        let report = detect(Some(&prev), &cur);
        assert!(report.breaking);
        assert_eq!(report.added, vec!["b".to_string()]);
        assert_eq!(report.removed, vec!["a".to_string()]);
    }
}
