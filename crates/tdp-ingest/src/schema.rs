//! Schema inference and schema history
//!
//! A dataset's observed schema is the name -> logical type mapping of its
//! columns, derived from the typed in-memory table. The schema hash is
//! computed over columns sorted by name, so two files carrying the same
//! columns in different physical order hash identically. Drift detection
//! depends on that invariant; it is covered by a dedicated test.
//!
//! Observed schemas are persisted append-only in `dataset_schemas`, one row
//! per distinct hash per dataset. The "current" schema of a dataset is always
//! an explicit read of the most recently seen row, never an in-memory cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::debug;

use crate::tabular::{LogicalType, TabularData};

/// One column of an observed schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
}

/// The simplified logical schema of one observed file.
///
/// Columns are sorted by name at construction; physical file order never
/// leaks into equality or hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedSchema {
    pub columns: Vec<ColumnSchema>,
    pub column_count: usize,
}

impl ObservedSchema {
    pub fn new(mut columns: Vec<ColumnSchema>) -> Self {
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        let column_count = columns.len();
        Self { columns, column_count }
    }

    /// Look up a column's logical type by name.
    pub fn logical_type(&self, name: &str) -> Option<LogicalType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.logical_type)
    }
}

/// Derive the observed schema of a table from its in-memory column types.
pub fn infer(table: &TabularData) -> ObservedSchema {
    let columns = table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnSchema {
            name: name.clone(),
            logical_type: table.column_logical_type(idx),
        })
        .collect();
    ObservedSchema::new(columns)
}

/// Deterministic content hash of an observed schema.
pub fn schema_hash(schema: &ObservedSchema) -> String {
    let mut hasher = Sha256::new();
    for col in &schema.columns {
        hasher.update(col.name.as_bytes());
        hasher.update(col.logical_type.as_str().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// A persisted schema observation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchemaRecord {
    pub schema_hash: String,
    pub schema_json: serde_json::Value,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl SchemaRecord {
    /// Decode the stored schema document.
    pub fn observed(&self) -> Result<ObservedSchema, serde_json::Error> {
        serde_json::from_value(self.schema_json.clone())
    }
}

/// Record a schema observation: insert a new (dataset, hash) row, or bump
/// `last_seen_at` when the same schema shows up again.
pub async fn record_observation(
    pool: &PgPool,
    dataset: &str,
    hash: &str,
    schema: &ObservedSchema,
) -> sqlx::Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO dataset_schemas (dataset, schema_hash, schema_json, first_seen_at, last_seen_at)
        VALUES ($1, $2, $3, $4, $4)
        ON CONFLICT (dataset, schema_hash)
        DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at
        "#,
    )
    .bind(dataset)
    .bind(hash)
    .bind(sqlx::types::Json(schema))
    .bind(now)
    .execute(pool)
    .await?;

    debug!(%dataset, schema_hash = %hash, "schema observation recorded");
    Ok(())
}

/// The most recently seen schema for a dataset, if any.
pub async fn latest_schema(pool: &PgPool, dataset: &str) -> sqlx::Result<Option<SchemaRecord>> {
    sqlx::query_as::<_, SchemaRecord>(
        r#"
        SELECT schema_hash, schema_json, first_seen_at, last_seen_at
        FROM dataset_schemas
        WHERE dataset = $1
        ORDER BY last_seen_at DESC
        LIMIT 1
        "#,
    )
    .bind(dataset)
    .fetch_optional(pool)
    .await
}

/// Schema history for a dataset, newest first.
pub async fn schema_history(
    pool: &PgPool,
    dataset: &str,
    limit: i64,
) -> sqlx::Result<Vec<SchemaRecord>> {
    let limit = limit.clamp(1, 200);
    sqlx::query_as::<_, SchemaRecord>(
        r#"
        SELECT schema_hash, schema_json, first_seen_at, last_seen_at
        FROM dataset_schemas
        WHERE dataset = $1
        ORDER BY last_seen_at DESC
        LIMIT $2
        "#,
    )
    .bind(dataset)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::Value;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> TabularData {
        TabularData::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn test_schema_hash_is_order_independent() {
        let a = table(
            &["b", "a"],
            vec![vec![Value::Number(1.0), Value::Text("x".to_string())]],
        );
        let b = table(
            &["a", "b"],
            vec![vec![Value::Text("x".to_string()), Value::Number(1.0)]],
        );

        assert_eq!(schema_hash(&infer(&a)), schema_hash(&infer(&b)));
        assert_eq!(infer(&a), infer(&b));
    }

    #[test]
    fn test_schema_hash_changes_with_type() {
        let a = table(&["a"], vec![vec![Value::Number(1.0)]]);
        let b = table(&["a"], vec![vec![Value::Text("1".to_string())]]);
        assert_ne!(schema_hash(&infer(&a)), schema_hash(&infer(&b)));
    }

    #[test]
    fn test_schema_hash_changes_with_column_set() {
        let a = table(&["a"], vec![vec![Value::Number(1.0)]]);
        let b = table(&["a", "c"], vec![vec![Value::Number(1.0), Value::Null]]);
        assert_ne!(schema_hash(&infer(&a)), schema_hash(&infer(&b)));
    }

    #[test]
    fn test_infer_defaults_all_null_columns_to_string() {
        let t = table(&["x"], vec![vec![Value::Null], vec![Value::Null]]);
        assert_eq!(infer(&t).logical_type("x"), Some(LogicalType::String));
    }

    #[test]
    fn test_schema_round_trips_through_json() {
        let schema = ObservedSchema::new(vec![
            ColumnSchema { name: "id".to_string(), logical_type: LogicalType::String },
            ColumnSchema { name: "amount".to_string(), logical_type: LogicalType::Number },
        ]);
        let json = serde_json::to_value(&schema).unwrap();
        let back: ObservedSchema = serde_json::from_value(json).unwrap();
        assert_eq!(schema, back);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_latest_schema_follows_last_seen(pool: PgPool) -> sqlx::Result<()> {
        let first = ObservedSchema::new(vec![ColumnSchema {
            name: "a".to_string(),
            logical_type: LogicalType::Number,
        }]);
        let second = ObservedSchema::new(vec![ColumnSchema {
            name: "a".to_string(),
            logical_type: LogicalType::String,
        }]);

        record_observation(&pool, "parcels", &schema_hash(&first), &first).await?;
        record_observation(&pool, "parcels", &schema_hash(&second), &second).await?;

        let latest = latest_schema(&pool, "parcels").await?.unwrap();
        assert_eq!(latest.schema_hash, schema_hash(&second));

        // Re-observing the first schema bumps it back to the front.
        record_observation(&pool, "parcels", &schema_hash(&first), &first).await?;
        let latest = latest_schema(&pool, "parcels").await?.unwrap();
        assert_eq!(latest.schema_hash, schema_hash(&first));

        let history = schema_history(&pool, "parcels", 10).await?;
        assert_eq!(history.len(), 2);

        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_latest_schema_none_for_unknown_dataset(pool: PgPool) -> sqlx::Result<()> {
        assert!(latest_schema(&pool, "nope").await?.is_none());
        Ok(())
    }
}
