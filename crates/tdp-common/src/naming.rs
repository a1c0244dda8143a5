//! Naming rules for user-controlled identifiers
//!
//! Dataset and column names become directory names in the raw landing zone,
//! contract filenames, and SQL identifiers (`curated_<dataset>`). Keeping the
//! rules strict prevents path traversal, casing surprises (Postgres lowercases
//! unquoted identifiers), and injection through dynamically built identifiers.
//!
//! Convention: lowercase letters, digits, underscore; must start with a
//! letter; max 63 characters (the Postgres identifier limit).

use crate::error::TdpError;

const MAX_IDENT_LEN: usize = 63;

/// Normalize and validate a dataset name.
///
/// Mixed-case input is accepted and lowercased; anything that still fails the
/// identifier rules is rejected.
pub fn normalize_dataset_name(dataset: &str) -> Result<String, TdpError> {
    let d = dataset.trim().to_ascii_lowercase();
    if d.is_empty() {
        return Err(TdpError::InvalidDataset("dataset name is required".to_string()));
    }
    if !is_safe_identifier(&d) {
        return Err(TdpError::InvalidDataset(format!(
            "invalid dataset name {dataset:?}: use lowercase letters/digits/underscore, \
             start with a letter, max {MAX_IDENT_LEN} chars"
        )));
    }
    Ok(d)
}

/// Validate a contract column name. No normalization: contracts must spell
/// column names exactly as they appear in curated tables.
pub fn validate_column_name(column: &str) -> Result<(), TdpError> {
    if is_safe_identifier(column) {
        Ok(())
    } else {
        Err(TdpError::InvalidColumn(format!(
            "invalid column name {column:?}: use lowercase letters/digits/underscore, \
             start with a letter, max {MAX_IDENT_LEN} chars"
        )))
    }
}

/// Check the shared identifier rules without allocating.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    if name.len() > MAX_IDENT_LEN {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Quote an identifier for interpolation into dynamically built SQL.
///
/// Only used for identifiers that already passed [`is_safe_identifier`];
/// quoting is belt-and-suspenders for the curated-table DDL path.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_and_lowercases() {
        assert_eq!(normalize_dataset_name("Recorder_Sales").unwrap(), "recorder_sales");
        assert_eq!(normalize_dataset_name(" parcels ").unwrap(), "parcels");
        assert_eq!(normalize_dataset_name("real_estate_2026").unwrap(), "real_estate_2026");
    }

    #[test]
    fn test_normalize_rejects_bad_names() {
        for bad in ["", "1parcels", "par-cels", "par cels", "../etc", "_x"] {
            assert!(normalize_dataset_name(bad).is_err(), "expected rejection: {bad:?}");
        }
    }

    #[test]
    fn test_normalize_rejects_overlong() {
        let long = format!("a{}", "b".repeat(63));
        assert!(normalize_dataset_name(&long).is_err());
    }

    #[test]
    fn test_validate_column_name() {
        assert!(validate_column_name("sale_price").is_ok());
        assert!(validate_column_name("SalePrice").is_err());
        assert!(validate_column_name("9lives").is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
