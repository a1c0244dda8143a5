//! Contract-based quality validation
//!
//! Checks an observed table against its dataset contract and the drift
//! classification, producing a [`QualityReport`] with a pass/fail verdict,
//! error and warning lists, and profiling metrics. Metrics are computed even
//! when validation fails so a rejected ingestion stays diagnosable.
//!
//! Drift policy is applied here, not in the detector: `allow` records drift
//! silently, `warn` adds a warning, and `fail` rejects the ingestion - but
//! only for breaking drift. Additive drift under `fail` still only warns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::contracts::{ColumnRule, Contract, DriftPolicy};
use crate::drift::DriftReport;
use crate::tabular::TabularData;

/// Profiling metrics, always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub row_count: usize,
    pub column_count: usize,
    pub null_fractions: BTreeMap<String, f64>,
}

/// The verdict for one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: QualityMetrics,
    pub drift: DriftReport,
    pub drift_policy: DriftPolicy,
    /// True when breaking drift under policy `fail` forced the verdict; the
    /// processor uses this to pick FAILED_DRIFT over FAILED_QUALITY.
    pub drift_rejected: bool,
}

/// Validate a table against its contract and drift classification.
pub fn validate(
    table: &TabularData,
    contract: &Contract,
    drift: &DriftReport,
    policy: DriftPolicy,
) -> QualityReport {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    // Required columns
    for (name, rule) in &contract.columns {
        if rule.required && table.column_index(name).is_none() {
            errors.push(format!("missing required column: {name}"));
        }
    }

    // Unexpected columns are a warning only; drift owns that story.
    let unexpected: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| !contract.columns.contains_key(c.as_str()))
        .map(|c| c.as_str())
        .collect();
    if !unexpected.is_empty() {
        warnings.push(format!("unexpected columns present: {}", unexpected.join(", ")));
    }

    // Per-column rules
    for (name, rule) in &contract.columns {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        check_coercibility(table, idx, name, rule, &mut errors);
        check_bounds(table, idx, name, rule, &mut errors);
        if rule.unique && has_duplicates(table, idx) {
            errors.push(format!("duplicate values in unique column: {name}"));
        }
    }

    // Primary key uniqueness, independent of any `unique` flag on the column.
    if let Some(pk) = contract.primary_key.as_deref() {
        if let Some(idx) = table.column_index(pk) {
            let pk_rule_unique = contract.columns.get(pk).map(|r| r.unique).unwrap_or(false);
            if !pk_rule_unique && has_duplicates(table, idx) {
                errors.push(format!("primary key contains duplicates: {pk}"));
            }
        }
    }

    // Null-fraction thresholds
    for (name, threshold) in &contract.max_null_fraction {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        let frac = table.null_fraction(idx);
        if frac > *threshold {
            errors.push(format!(
                "null fraction {frac:.2} exceeds threshold {threshold:.2} in column: {name}"
            ));
        }
    }

    // Drift gating
    let mut drift_rejected = false;
    if drift.is_drift() {
        match policy {
            DriftPolicy::Allow => {},
            DriftPolicy::Fail if drift.breaking => {
                drift_rejected = true;
                errors.push(format!(
                    "breaking schema drift rejected (removed: [{}], changed: [{}])",
                    drift.removed.join(", "),
                    drift
                        .changed_type
                        .iter()
                        .map(|(col, ch)| format!("{col}: {} -> {}", ch.from, ch.to))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            },
            DriftPolicy::Warn | DriftPolicy::Fail => {
                warnings.push(format!(
                    "schema drift detected (added: [{}], removed: [{}], changed: [{}])",
                    drift.added.join(", "),
                    drift.removed.join(", "),
                    drift.changed_type.keys().cloned().collect::<Vec<_>>().join(", ")
                ));
            },
        }
    }

    let metrics = QualityMetrics {
        row_count: table.row_count(),
        column_count: table.column_count(),
        null_fractions: table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), table.null_fraction(idx)))
            .collect(),
    };

    QualityReport {
        ok: errors.is_empty(),
        errors,
        warnings,
        metrics,
        drift: drift.clone(),
        drift_policy: policy,
        drift_rejected,
    }
}

fn check_coercibility(
    table: &TabularData,
    idx: usize,
    name: &str,
    rule: &ColumnRule,
    errors: &mut Vec<String>,
) {
    let bad = table
        .column_values(idx)
        .filter(|v| !v.coerces_to(rule.logical_type))
        .count();
    if bad > 0 {
        errors.push(format!(
            "{bad} value(s) not coercible to {} in column: {name}",
            rule.logical_type
        ));
    }
}

fn check_bounds(
    table: &TabularData,
    idx: usize,
    name: &str,
    rule: &ColumnRule,
    errors: &mut Vec<String>,
) {
    if rule.min.is_none() && rule.max.is_none() {
        return;
    }
    let numbers = table.column_values(idx).filter_map(|v| v.coerce_number());
    let mut below = 0usize;
    let mut above = 0usize;
    for n in numbers {
        if rule.min.is_some_and(|min| n < min) {
            below += 1;
        }
        if rule.max.is_some_and(|max| n > max) {
            above += 1;
        }
    }
    if below > 0 {
        errors.push(format!(
            "{below} value(s) below declared min {} in column: {name}",
            rule.min.unwrap_or_default()
        ));
    }
    if above > 0 {
        errors.push(format!(
            "{above} value(s) above declared max {} in column: {name}",
            rule.max.unwrap_or_default()
        ));
    }
}

/// A persisted quality report row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredReport {
    pub ingestion_id: Uuid,
    pub passed: bool,
    pub report: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Persist the quality report document for an ingestion attempt.
///
/// One report per ingestion; a rewrite only happens if the same record is
/// reprocessed in place, which the replay-creates-new-record rule prevents.
pub async fn store_report(
    pool: &PgPool,
    ingestion_id: Uuid,
    passed: bool,
    report: &serde_json::Value,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quality_reports (ingestion_id, passed, report, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (ingestion_id)
        DO UPDATE SET passed = EXCLUDED.passed, report = EXCLUDED.report,
                      created_at = EXCLUDED.created_at
        "#,
    )
    .bind(ingestion_id)
    .bind(passed)
    .bind(report)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch the stored quality report for an ingestion, if validation ran.
pub async fn get_report(pool: &PgPool, ingestion_id: Uuid) -> sqlx::Result<Option<StoredReport>> {
    sqlx::query_as::<_, StoredReport>(
        "SELECT ingestion_id, passed, report, created_at FROM quality_reports WHERE ingestion_id = $1",
    )
    .bind(ingestion_id)
    .fetch_optional(pool)
    .await
}

/// Duplicate detection over the text form of non-null values.
fn has_duplicates(table: &TabularData, idx: usize) -> bool {
    let mut seen = HashSet::new();
    for value in table.column_values(idx) {
        let Some(key) = value.coerce_text() else {
            continue;
        };
        if !seen.insert(key) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::parse_contract_yaml;
    use crate::drift::{detect, DriftKind, DriftReport};
    use crate::schema::{infer, ObservedSchema};
    use crate::tabular::{LogicalType, Value};

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> TabularData {
        TabularData::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn contract(yaml: &str) -> Contract {
        parse_contract_yaml(yaml).unwrap()
    }

    const BASIC: &str = r#"
dataset: unit_test
columns:
  id: { type: string, required: true, unique: true }
  value: { type: number }
"#;

    #[test]
    fn test_missing_required_column_fails() {
        let c = contract(BASIC);
        let t = table(&["value"], vec![vec![Value::Number(1.0)], vec![Value::Number(2.0)]]);
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert!(report.errors.iter().any(|e| e == "missing required column: id"));
        // metrics still computed on failure
        assert_eq!(report.metrics.row_count, 2);
        assert_eq!(report.metrics.column_count, 1);
    }

    #[test]
    fn test_duplicate_unique_values_fail_with_exact_message() {
        let c = contract(BASIC);
        let t = table(
            &["id", "value"],
            vec![
                vec![text("a"), Value::Number(1.0)],
                vec![text("a"), Value::Number(2.0)],
            ],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert_eq!(report.errors, vec!["duplicate values in unique column: id".to_string()]);
    }

    #[test]
    fn test_nulls_do_not_count_as_duplicates() {
        let c = contract(BASIC);
        let t = table(
            &["id", "value"],
            vec![
                vec![text("a"), Value::Null],
                vec![Value::Null, Value::Null],
                vec![Value::Null, Value::Null],
            ],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);
        assert!(report.ok, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_primary_key_duplicates() {
        let c = contract(
            "dataset: t\nprimary_key: id\ncolumns:\n  id: { type: string, required: true }\n",
        );
        let t = table(&["id"], vec![vec![text("x")], vec![text("x")]]);
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert_eq!(report.errors, vec!["primary key contains duplicates: id".to_string()]);
    }

    #[test]
    fn test_type_coercibility() {
        let c = contract("dataset: t\ncolumns:\n  amount: { type: number }\n");
        let t = table(&["amount"], vec![vec![text("12.5")], vec![text("oops")]]);
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert!(report.errors[0].contains("not coercible to number in column: amount"));
    }

    #[test]
    fn test_numeric_bounds() {
        let c = contract("dataset: t\ncolumns:\n  score: { type: number, min: 0, max: 100 }\n");
        let t = table(
            &["score"],
            vec![
                vec![Value::Number(-5.0)],
                vec![Value::Number(50.0)],
                vec![Value::Number(101.0)],
            ],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.contains("below declared min")));
        assert!(report.errors.iter().any(|e| e.contains("above declared max")));
    }

    #[test]
    fn test_null_fraction_threshold() {
        let c = contract(
            "dataset: t\ncolumns:\n  v: { type: number }\nquality:\n  max_null_fraction:\n    v: 0.25\n",
        );
        let t = table(
            &["v"],
            vec![vec![Value::Number(1.0)], vec![Value::Null], vec![Value::Null], vec![Value::Null]],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(!report.ok);
        assert!(report.errors[0].contains("exceeds threshold"));
        assert_eq!(report.metrics.null_fractions["v"], 0.75);
    }

    #[test]
    fn test_unexpected_columns_warn_only() {
        let c = contract(BASIC);
        let t = table(
            &["id", "value", "extra"],
            vec![vec![text("a"), Value::Number(1.0), text("x")]],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);

        assert!(report.ok);
        assert!(report.warnings.iter().any(|w| w.contains("unexpected columns")));
    }

    fn breaking_drift() -> DriftReport {
        let prev = infer(&table(&["a"], vec![vec![Value::Number(1.0)]]));
        let cur = infer(&table(&["a"], vec![vec![text("one")]]));
        let report = detect(Some(&prev), &cur);
        assert!(report.breaking);
        report
    }

    fn additive_drift() -> DriftReport {
        let prev = infer(&table(&["a"], vec![vec![Value::Number(1.0)]]));
        let cur = infer(&table(&["a", "b"], vec![vec![Value::Number(1.0), text("x")]]));
        let report = detect(Some(&prev), &cur);
        assert!(!report.breaking);
        report
    }

    fn empty_ok_table() -> (Contract, TabularData) {
        let c = contract("dataset: t\ncolumns:\n  a: { type: number }\n");
        let t = table(&["a"], vec![vec![Value::Number(1.0)]]);
        (c, t)
    }

    #[test]
    fn test_breaking_drift_under_warn_passes_with_warning() {
        let (c, t) = empty_ok_table();
        let report = validate(&t, &c, &breaking_drift(), DriftPolicy::Warn);

        assert!(report.ok);
        assert!(!report.drift_rejected);
        assert!(report.warnings.iter().any(|w| w.contains("schema drift detected")));
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_breaking_drift_under_fail_rejects() {
        let (c, t) = empty_ok_table();
        let report = validate(&t, &c, &breaking_drift(), DriftPolicy::Fail);

        assert!(!report.ok);
        assert!(report.drift_rejected);
        assert!(report.errors.iter().any(|e| e.contains("breaking schema drift")));
    }

    #[test]
    fn test_additive_drift_under_fail_only_warns() {
        let (c, t) = empty_ok_table();
        let report = validate(&t, &c, &additive_drift(), DriftPolicy::Fail);

        assert!(report.ok);
        assert!(!report.drift_rejected);
        assert!(report.warnings.iter().any(|w| w.contains("schema drift detected")));
    }

    #[test]
    fn test_drift_under_allow_is_silent() {
        let (c, t) = empty_ok_table();
        let report = validate(&t, &c, &breaking_drift(), DriftPolicy::Allow);

        assert!(report.ok);
        assert!(report.warnings.is_empty());
        assert_eq!(report.drift.kind, DriftKind::Drift);
    }

    #[test]
    fn test_baseline_observation_has_no_drift_effect() {
        let (c, t) = empty_ok_table();
        let current: ObservedSchema = infer(&t);
        let drift = detect(None, &current);
        let report = validate(&t, &c, &drift, DriftPolicy::Fail);

        assert!(report.ok);
        assert!(report.warnings.is_empty());
        assert_eq!(report.drift.kind, DriftKind::None);
    }

    #[test]
    fn test_boolean_and_datetime_coercions_accepted() {
        let c = contract(
            "dataset: t\ncolumns:\n  flag: { type: boolean }\n  seen: { type: datetime }\n",
        );
        let t = table(
            &["flag", "seen"],
            vec![
                vec![text("yes"), text("2026-03-01")],
                vec![Value::Bool(false), text("2026-03-02T10:00:00Z")],
            ],
        );
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);
        assert!(report.ok, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_logical_type_in_error_mentions_declared_type() {
        let c = contract("dataset: t\ncolumns:\n  seen: { type: datetime }\n");
        let t = table(&["seen"], vec![vec![text("not a date")]]);
        let report = validate(&t, &c, &DriftReport::none(), DriftPolicy::Warn);
        assert!(report.errors[0].contains(LogicalType::Datetime.as_str()));
    }
}
