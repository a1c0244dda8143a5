//! Tabular file readers and the typed in-memory table
//!
//! Raw files are parsed once into a [`TabularData`] whose cells carry their
//! runtime type ([`Value`]). Everything downstream - schema inference, drift
//! detection, quality validation, curated loading - works off these in-memory
//! types and never re-sniffs raw text.
//!
//! Cell typing happens at parse time: the CSV reader recognizes boolean,
//! numeric, and datetime lexemes; the XLSX reader uses the workbook's own cell
//! types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tdp_common::{Result, TdpError};

/// The closed set of logical column types used for schema inference, drift
/// detection, and curated-table DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Number,
    Boolean,
    Datetime,
}

impl LogicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
        }
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// Boolean lexemes accepted when coercing text cells.
const BOOL_LEXEMES_TRUE: &[&str] = &["true", "1", "yes", "y"];
const BOOL_LEXEMES_FALSE: &[&str] = &["false", "0", "no", "n"];

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The logical type this cell was parsed as; `None` for nulls.
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(LogicalType::String),
            Value::Number(_) => Some(LogicalType::Number),
            Value::Bool(_) => Some(LogicalType::Boolean),
            Value::Timestamp(_) => Some(LogicalType::Datetime),
        }
    }

    /// Render the cell as text. Any non-null cell has a text form.
    pub fn coerce_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Bool(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(ts.to_rfc3339()),
        }
    }

    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            // CSV cells "1"/"0" parse as numbers; they are still valid
            // booleans under a boolean-typed contract column.
            Value::Number(n) if *n == 0.0 || *n == 1.0 => Some(*n == 1.0),
            Value::Text(s) => {
                let lower = s.trim().to_ascii_lowercase();
                if BOOL_LEXEMES_TRUE.contains(&lower.as_str()) {
                    Some(true)
                } else if BOOL_LEXEMES_FALSE.contains(&lower.as_str()) {
                    Some(false)
                } else {
                    None
                }
            },
            _ => None,
        }
    }

    pub fn coerce_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Whether this cell can be represented as `target` without loss of
    /// meaning. Nulls coerce to anything.
    pub fn coerces_to(&self, target: LogicalType) -> bool {
        if self.is_null() {
            return true;
        }
        match target {
            LogicalType::String => self.coerce_text().is_some(),
            LogicalType::Number => self.coerce_number().is_some(),
            LogicalType::Boolean => self.coerce_bool().is_some(),
            LogicalType::Datetime => self.coerce_timestamp().is_some(),
        }
    }
}

/// An in-memory table: header names plus typed rows, all rows the same width.
#[derive(Debug, Clone)]
pub struct TabularData {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TabularData {
    /// Build a table from headers and rows, checking widths and duplicate
    /// header names.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(TdpError::Parse(format!("duplicate column header: {col:?}")));
            }
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TdpError::Parse(format!(
                    "row {} has {} cells, expected {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the cells of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// The dominant logical type of a column: the shared type of its non-null
    /// cells, or `String` when the column is empty or mixed.
    pub fn column_logical_type(&self, index: usize) -> LogicalType {
        let mut observed: Option<LogicalType> = None;
        for value in self.column_values(index) {
            let Some(ty) = value.logical_type() else {
                continue;
            };
            match observed {
                None => observed = Some(ty),
                Some(seen) if seen == ty => {},
                Some(_) => return LogicalType::String,
            }
        }
        observed.unwrap_or(LogicalType::String)
    }

    /// Fraction of null cells in a column; 0.0 for an empty table.
    pub fn null_fraction(&self, index: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let nulls = self.column_values(index).filter(|v| v.is_null()).count();
        nulls as f64 / self.rows.len() as f64
    }
}

/// Read a raw file into a [`TabularData`] based on its recorded extension.
pub fn read_table(path: impl AsRef<Path>, ext: &str) -> Result<TabularData> {
    match ext.to_ascii_lowercase().as_str() {
        ".csv" => read_csv(path.as_ref()),
        ".xlsx" | ".xls" => read_workbook(path.as_ref()),
        other => Err(TdpError::UnsupportedFileType(other.to_string())),
    }
}

fn read_csv(path: &Path) -> Result<TabularData> {
    let mut reader = ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| TdpError::Parse(format!("failed to open CSV: {e}")))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| TdpError::Parse(format!("failed to read CSV headers: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TdpError::Parse(format!("malformed CSV row: {e}")))?;
        rows.push(record.iter().map(parse_csv_cell).collect());
    }

    TabularData::from_rows(columns, rows)
}

/// Type a raw CSV cell. Recognition order matters: boolean lexemes before
/// numbers (so "1"/"0" stay boolean-coercible but type as number only via
/// explicit true/false), numbers before dates (so "2026" is a number).
fn parse_csv_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(n) = parse_number(trimmed) {
        return Value::Number(n);
    }
    if let Some(ts) = parse_timestamp(trimmed) {
        return Value::Timestamp(ts);
    }
    Value::Text(trimmed.to_string())
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // f64::from_str accepts "nan"/"inf"; those are text in tabular files.
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("nan") || lower.contains("inf") {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn read_workbook(path: &Path) -> Result<TabularData> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| TdpError::Parse(format!("failed to open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TdpError::Parse("workbook has no sheets".to_string()))?
        .map_err(|e| TdpError::Parse(format!("failed to read first sheet: {e}")))?;

    let mut row_iter = range.rows();
    let Some(header_row) = row_iter.next() else {
        return TabularData::from_rows(Vec::new(), Vec::new());
    };

    // Trailing empty header cells are common in hand-edited sheets; drop them
    // and truncate data rows to the surviving width.
    let mut columns: Vec<String> = header_row
        .iter()
        .map(|cell| match cell {
            Data::Empty => String::new(),
            other => other.to_string().trim().to_string(),
        })
        .collect();
    while columns.last().is_some_and(|c| c.is_empty()) {
        columns.pop();
    }
    if columns.iter().any(|c| c.is_empty()) {
        return Err(TdpError::Parse("workbook has an empty column header".to_string()));
    }

    let width = columns.len();
    let mut rows = Vec::new();
    for sheet_row in row_iter {
        let mut row: Vec<Value> = sheet_row.iter().take(width).map(workbook_cell).collect();
        row.resize(width, Value::Null);
        rows.push(row);
    }

    TabularData::from_rows(columns, rows)
}

fn workbook_cell(cell: &calamine::Data) -> Value {
    use calamine::Data;

    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::Text(trimmed.to_string())
            }
        },
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::Timestamp(Utc.from_utc_datetime(&naive)),
            None => Value::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match parse_timestamp(s) {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Text(s.clone()),
        },
        Data::DurationIso(s) => Value::Text(s.clone()),
        // Formula errors land as nulls; the quality gate's null-fraction
        // thresholds surface them.
        Data::Error(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_csv_cell_typing() {
        assert_eq!(parse_csv_cell(""), Value::Null);
        assert_eq!(parse_csv_cell("  "), Value::Null);
        assert_eq!(parse_csv_cell("TRUE"), Value::Bool(true));
        assert_eq!(parse_csv_cell("false"), Value::Bool(false));
        assert_eq!(parse_csv_cell("42"), Value::Number(42.0));
        assert_eq!(parse_csv_cell("-3.5"), Value::Number(-3.5));
        assert_eq!(parse_csv_cell("hello"), Value::Text("hello".to_string()));
        assert!(matches!(parse_csv_cell("2026-01-15"), Value::Timestamp(_)));
        assert!(matches!(parse_csv_cell("2026-01-15T08:30:00Z"), Value::Timestamp(_)));
        // nan/inf are text, not numbers
        assert_eq!(parse_csv_cell("NaN"), Value::Text("NaN".to_string()));
        assert_eq!(parse_csv_cell("inf"), Value::Text("inf".to_string()));
    }

    #[test]
    fn test_read_csv_infers_column_types() {
        let (_dir, path) = write_csv("id,price,active,sold_at\na,10,true,2026-01-01\nb,11.5,false,2026-01-02\n");
        let table = read_table(&path, ".csv").unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns(), ["id", "price", "active", "sold_at"]);
        assert_eq!(table.column_logical_type(0), LogicalType::String);
        assert_eq!(table.column_logical_type(1), LogicalType::Number);
        assert_eq!(table.column_logical_type(2), LogicalType::Boolean);
        assert_eq!(table.column_logical_type(3), LogicalType::Datetime);
    }

    #[test]
    fn test_mixed_column_falls_back_to_string() {
        let (_dir, path) = write_csv("v\n1\nhello\n");
        let table = read_table(&path, ".csv").unwrap();
        assert_eq!(table.column_logical_type(0), LogicalType::String);
    }

    #[test]
    fn test_empty_column_defaults_to_string() {
        let (_dir, path) = write_csv("a,b\n1,\n2,\n");
        let table = read_table(&path, ".csv").unwrap();
        assert_eq!(table.column_logical_type(1), LogicalType::String);
        assert_eq!(table.null_fraction(1), 1.0);
    }

    #[test]
    fn test_headers_only_file_is_valid() {
        let (_dir, path) = write_csv("a,b,c\n");
        let table = read_table(&path, ".csv").unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column_count(), 3);
    }

    #[test]
    fn test_ragged_csv_is_rejected() {
        let (_dir, path) = write_csv("a,b\n1,2\n3\n");
        assert!(read_table(&path, ".csv").is_err());
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let (_dir, path) = write_csv("a,a\n1,2\n");
        assert!(read_table(&path, ".csv").is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let (_dir, path) = write_csv("a\n1\n");
        let err = read_table(&path, ".parquet").unwrap_err();
        assert!(matches!(err, TdpError::UnsupportedFileType(_)));
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(Value::Text("12".to_string()).coerce_number(), Some(12.0));
        assert_eq!(Value::Text("yes".to_string()).coerce_bool(), Some(true));
        assert_eq!(Value::Text("n".to_string()).coerce_bool(), Some(false));
        assert_eq!(Value::Number(1.0).coerce_bool(), Some(true));
        assert_eq!(Value::Number(2.0).coerce_bool(), None);
        assert!(Value::Text("2026-05-01".to_string()).coerce_timestamp().is_some());
        assert!(Value::Null.coerces_to(LogicalType::Number));
        assert!(!Value::Text("abc".to_string()).coerces_to(LogicalType::Number));
    }

    #[test]
    fn test_number_text_rendering() {
        assert_eq!(Value::Number(42.0).coerce_text().as_deref(), Some("42"));
        assert_eq!(Value::Number(1.25).coerce_text().as_deref(), Some("1.25"));
    }
}
