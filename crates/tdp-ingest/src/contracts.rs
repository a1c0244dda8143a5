//! Dataset contracts
//!
//! A contract is the declarative, per-dataset specification of required
//! structure and quality thresholds: column rules (type, required, unique,
//! numeric bounds), null-fraction thresholds, and the drift policy. Contracts
//! live as YAML documents, one per dataset, and are loaded fresh for every
//! ingestion - parsing is deterministic, so there is nothing to cache.
//!
//! Documents are validated whole: a malformed contract is rejected with a
//! descriptive error, never half-applied.
//!
//! ```yaml
//! dataset: recorder_sales
//! description: County recorder property sales
//! primary_key: sale_id
//! columns:
//!   sale_id: { type: string, required: true, unique: true }
//!   sale_price: { type: number, min: 0 }
//!   recorded_at: { type: datetime, required: true }
//! quality:
//!   max_null_fraction:
//!     sale_price: 0.05
//! drift_policy: fail
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tdp_common::checksum::sha256_bytes;
use tdp_common::naming::{normalize_dataset_name, validate_column_name};
use thiserror::Error;

use crate::tabular::LogicalType;

/// How drift against the last recorded schema affects validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Drift adds a warning to the quality report (default).
    #[default]
    Warn,
    /// Breaking drift fails the ingestion; non-breaking drift still only warns.
    Fail,
    /// Drift is recorded but never affects the verdict.
    Allow,
}

impl DriftPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Allow => "allow",
        }
    }
}

impl std::str::FromStr for DriftPolicy {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            "allow" => Ok(Self::Allow),
            other => Err(ContractError::InvalidDriftPolicy(other.to_string())),
        }
    }
}

impl std::fmt::Display for DriftPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while loading or validating a contract document.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Contract not found for dataset '{dataset}' at {path}")]
    NotFound { dataset: String, path: PathBuf },

    #[error("IO error reading contract: {0}")]
    Io(#[from] std::io::Error),

    #[error("Contract YAML is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Contract YAML is empty")]
    Empty,

    #[error("{0}")]
    InvalidName(String),

    #[error("Contract must declare a non-empty 'columns' mapping")]
    NoColumns,

    #[error("Unsupported type '{declared}' for column '{column}'")]
    UnsupportedType { column: String, declared: String },

    #[error("primary_key '{0}' must be one of the declared columns")]
    PrimaryKeyNotDeclared(String),

    #[error("quality.max_null_fraction references unknown column '{0}'")]
    UnknownThresholdColumn(String),

    #[error("quality.max_null_fraction for '{column}' must be between 0 and 1, got {value}")]
    ThresholdOutOfRange { column: String, value: f64 },

    #[error("drift_policy must be one of warn|fail|allow, got '{0}'")]
    InvalidDriftPolicy(String),
}

/// Validation rules for a single contract column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub logical_type: LogicalType,
    pub required: bool,
    pub unique: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// A normalized, validated dataset contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub dataset: String,
    pub description: String,
    pub primary_key: Option<String>,
    pub columns: BTreeMap<String, ColumnRule>,
    pub max_null_fraction: BTreeMap<String, f64>,
    pub drift_policy: Option<DriftPolicy>,
}

impl Contract {
    /// The drift policy in effect, given the platform default.
    pub fn effective_drift_policy(&self, default: DriftPolicy) -> DriftPolicy {
        self.drift_policy.unwrap_or(default)
    }
}

/// A loaded contract plus provenance for lineage.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub contract: Contract,
    pub path: PathBuf,
    pub fingerprint: String,
}

// Raw document shape as written by users; normalized into `Contract`.
#[derive(Debug, Deserialize)]
struct RawContract {
    dataset: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default)]
    columns: BTreeMap<String, Option<RawColumnSpec>>,
    #[serde(default)]
    quality: Option<RawQuality>,
    #[serde(default)]
    drift_policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawColumnSpec {
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    unique: Option<bool>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawQuality {
    #[serde(default)]
    max_null_fraction: Option<BTreeMap<String, f64>>,
}

/// Parse and validate a contract YAML document.
pub fn parse_contract_yaml(raw_yaml: &str) -> Result<Contract, ContractError> {
    if raw_yaml.trim().is_empty() {
        return Err(ContractError::Empty);
    }

    let raw: RawContract = serde_yaml::from_str(raw_yaml)?;

    let dataset = normalize_dataset_name(&raw.dataset)
        .map_err(|e| ContractError::InvalidName(e.to_string()))?;

    if raw.columns.is_empty() {
        return Err(ContractError::NoColumns);
    }

    let mut columns = BTreeMap::new();
    for (name, spec) in raw.columns {
        validate_column_name(&name).map_err(|e| ContractError::InvalidName(e.to_string()))?;
        let spec = spec.unwrap_or_default();
        let logical_type = match spec.type_name.as_deref() {
            None => LogicalType::String,
            Some(declared) => parse_type_alias(declared).ok_or_else(|| {
                ContractError::UnsupportedType { column: name.clone(), declared: declared.to_string() }
            })?,
        };
        columns.insert(
            name,
            ColumnRule {
                logical_type,
                required: spec.required.unwrap_or(false),
                unique: spec.unique.unwrap_or(false),
                min: spec.min,
                max: spec.max,
            },
        );
    }

    let primary_key = raw
        .primary_key
        .map(|pk| pk.trim().to_string())
        .filter(|pk| !pk.is_empty());
    if let Some(ref pk) = primary_key {
        if !columns.contains_key(pk) {
            return Err(ContractError::PrimaryKeyNotDeclared(pk.clone()));
        }
    }

    let mut max_null_fraction = BTreeMap::new();
    if let Some(thresholds) = raw.quality.and_then(|q| q.max_null_fraction) {
        for (column, value) in thresholds {
            if !columns.contains_key(&column) {
                return Err(ContractError::UnknownThresholdColumn(column));
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(ContractError::ThresholdOutOfRange { column, value });
            }
            max_null_fraction.insert(column, value);
        }
    }

    let drift_policy = raw
        .drift_policy
        .map(|p| p.parse::<DriftPolicy>())
        .transpose()?;

    Ok(Contract {
        dataset,
        description: raw.description.unwrap_or_default(),
        primary_key,
        columns,
        max_null_fraction,
        drift_policy,
    })
}

/// Contract type aliases accepted in documents, collapsed onto the logical
/// type set used everywhere else.
fn parse_type_alias(declared: &str) -> Option<LogicalType> {
    match declared.trim().to_ascii_lowercase().as_str() {
        "string" | "text" => Some(LogicalType::String),
        "integer" | "int" | "number" | "float" | "double" => Some(LogicalType::Number),
        "boolean" | "bool" => Some(LogicalType::Boolean),
        "datetime" | "timestamp" => Some(LogicalType::Datetime),
        _ => None,
    }
}

/// Content hash of the canonical serialization of a contract.
///
/// Canonical means the normalized form: sorted column maps, aliases collapsed,
/// defaults applied. Two documents that mean the same thing fingerprint
/// identically, which is what lineage reproducibility needs.
pub fn fingerprint(contract: &Contract) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(contract)?;
    Ok(sha256_bytes(&canonical))
}

/// Load the contract for a dataset from the contracts directory.
pub fn load(contracts_dir: &Path, dataset: &str) -> Result<ContractHandle, ContractError> {
    let dataset = normalize_dataset_name(dataset)
        .map_err(|e| ContractError::InvalidName(e.to_string()))?;
    let path = contracts_dir.join(format!("{dataset}.yaml"));
    if !path.exists() {
        return Err(ContractError::NotFound { dataset, path });
    }

    let raw = std::fs::read_to_string(&path)?;
    let contract = parse_contract_yaml(&raw)?;
    let fingerprint = fingerprint(&contract)
        .map_err(|e| ContractError::InvalidName(format!("failed to fingerprint contract: {e}")))?;

    Ok(ContractHandle { contract, path, fingerprint })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
dataset: recorder_sales
description: County recorder property sales
primary_key: sale_id
columns:
  sale_id: { type: string, required: true, unique: true }
  sale_price: { type: number, min: 0 }
  recorded_at: { type: datetime, required: true }
quality:
  max_null_fraction:
    sale_price: 0.05
drift_policy: fail
"#;

    #[test]
    fn test_parse_valid_contract() {
        let contract = parse_contract_yaml(SAMPLE).unwrap();
        assert_eq!(contract.dataset, "recorder_sales");
        assert_eq!(contract.primary_key.as_deref(), Some("sale_id"));
        assert_eq!(contract.columns.len(), 3);
        assert_eq!(contract.columns["sale_price"].logical_type, LogicalType::Number);
        assert_eq!(contract.columns["sale_price"].min, Some(0.0));
        assert!(contract.columns["sale_id"].unique);
        assert_eq!(contract.max_null_fraction["sale_price"], 0.05);
        assert_eq!(contract.drift_policy, Some(DriftPolicy::Fail));
    }

    #[test]
    fn test_type_aliases_collapse() {
        let yaml = r#"
dataset: t
columns:
  a: { type: int }
  b: { type: double }
  c: { type: text }
  d: { type: timestamp }
  e:
"#;
        let contract = parse_contract_yaml(yaml).unwrap();
        assert_eq!(contract.columns["a"].logical_type, LogicalType::Number);
        assert_eq!(contract.columns["b"].logical_type, LogicalType::Number);
        assert_eq!(contract.columns["c"].logical_type, LogicalType::String);
        assert_eq!(contract.columns["d"].logical_type, LogicalType::Datetime);
        // bare column entry defaults to string, nothing required
        assert_eq!(contract.columns["e"].logical_type, LogicalType::String);
        assert!(!contract.columns["e"].required);
    }

    #[test]
    fn test_rejects_empty_document() {
        assert!(matches!(parse_contract_yaml("  \n"), Err(ContractError::Empty)));
    }

    #[test]
    fn test_rejects_missing_columns() {
        let yaml = "dataset: t\ncolumns: {}\n";
        assert!(matches!(parse_contract_yaml(yaml), Err(ContractError::NoColumns)));
    }

    #[test]
    fn test_rejects_bad_column_name() {
        let yaml = "dataset: t\ncolumns:\n  BadName: { type: string }\n";
        assert!(matches!(parse_contract_yaml(yaml), Err(ContractError::InvalidName(_))));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let yaml = "dataset: t\ncolumns:\n  a: { type: decimal }\n";
        assert!(matches!(parse_contract_yaml(yaml), Err(ContractError::UnsupportedType { .. })));
    }

    #[test]
    fn test_rejects_undeclared_primary_key() {
        let yaml = "dataset: t\nprimary_key: missing\ncolumns:\n  a: { type: string }\n";
        assert!(matches!(
            parse_contract_yaml(yaml),
            Err(ContractError::PrimaryKeyNotDeclared(_))
        ));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let yaml = "dataset: t\ncolumns:\n  a: { type: string }\nquality:\n  max_null_fraction:\n    a: 1.5\n";
        assert!(matches!(
            parse_contract_yaml(yaml),
            Err(ContractError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_threshold_for_unknown_column() {
        let yaml = "dataset: t\ncolumns:\n  a: { type: string }\nquality:\n  max_null_fraction:\n    b: 0.5\n";
        assert!(matches!(
            parse_contract_yaml(yaml),
            Err(ContractError::UnknownThresholdColumn(_))
        ));
    }

    #[test]
    fn test_rejects_bad_drift_policy() {
        let yaml = "dataset: t\ncolumns:\n  a: { type: string }\ndrift_policy: explode\n";
        assert!(matches!(
            parse_contract_yaml(yaml),
            Err(ContractError::InvalidDriftPolicy(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_content_sensitive() {
        let a = parse_contract_yaml(SAMPLE).unwrap();
        let b = parse_contract_yaml(SAMPLE).unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());

        let changed = parse_contract_yaml(&SAMPLE.replace("0.05", "0.10")).unwrap();
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&changed).unwrap());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("recorder_sales.yaml"), SAMPLE).unwrap();

        let handle = load(dir.path(), "Recorder_Sales").unwrap();
        assert_eq!(handle.contract.dataset, "recorder_sales");
        assert_eq!(handle.fingerprint.len(), 64);

        let err = load(dir.path(), "missing").unwrap_err();
        assert!(matches!(err, ContractError::NotFound { .. }));
    }

    #[test]
    fn test_effective_drift_policy_falls_back_to_default() {
        let yaml = "dataset: t\ncolumns:\n  a: { type: string }\n";
        let contract = parse_contract_yaml(yaml).unwrap();
        assert_eq!(contract.effective_drift_policy(DriftPolicy::Warn), DriftPolicy::Warn);

        let contract = parse_contract_yaml(SAMPLE).unwrap();
        assert_eq!(contract.effective_drift_policy(DriftPolicy::Warn), DriftPolicy::Fail);
    }
}
