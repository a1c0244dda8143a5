//! Curated loader
//!
//! Materializes validated rows into the per-dataset `curated_<dataset>` table.
//! When the contract declares a primary key the load is an upsert keyed on
//! that column, which is what makes reprocessing the same logical rows
//! idempotent. Without a primary key the load is append-only and replays can
//! duplicate rows - a documented limitation, not something this module papers
//! over.
//!
//! Every written row carries three lineage columns: `_ingestion_id`,
//! `_loaded_at`, and `_source_sha256`. Writes are batched, and all batches of
//! one load share a single transaction: a failure anywhere rolls back the
//! whole load, so the ingestion fails atomically.

use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tdp_common::naming::quote_ident;
use tracing::debug;
use uuid::Uuid;

use crate::contracts::Contract;
use crate::tabular::{LogicalType, TabularData, Value};

/// Lineage columns present on every curated table.
const LINEAGE_COLUMNS: &[&str] = &["_ingestion_id", "_loaded_at", "_source_sha256"];

/// Outcome of a curated load.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoadResult {
    pub table: String,
    pub rows_loaded: u64,
}

/// The curated table name for a dataset.
pub fn curated_table_name(dataset: &str) -> String {
    format!("curated_{dataset}")
}

fn sql_type(logical_type: LogicalType) -> &'static str {
    match logical_type {
        LogicalType::String => "TEXT",
        LogicalType::Number => "DOUBLE PRECISION",
        LogicalType::Boolean => "BOOLEAN",
        LogicalType::Datetime => "TIMESTAMPTZ",
    }
}

/// Create the curated table for a contract if it does not exist yet.
///
/// Contract and dataset names have already passed identifier validation;
/// quoting on emission is belt-and-suspenders.
pub async fn ensure_curated_table(pool: &PgPool, contract: &Contract) -> sqlx::Result<String> {
    let table = curated_table_name(&contract.dataset);

    let mut cols_sql: Vec<String> = contract
        .columns
        .iter()
        .map(|(name, rule)| format!("{} {}", quote_ident(name), sql_type(rule.logical_type)))
        .collect();
    cols_sql.push("_ingestion_id UUID NOT NULL".to_string());
    cols_sql.push("_loaded_at TIMESTAMPTZ NOT NULL".to_string());
    cols_sql.push("_source_sha256 TEXT NOT NULL".to_string());

    let pk_sql = match contract.primary_key.as_deref() {
        Some(pk) => format!(", PRIMARY KEY ({})", quote_ident(pk)),
        None => String::new(),
    };

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} ({}{})",
        quote_ident(&table),
        cols_sql.join(", "),
        pk_sql
    );

    sqlx::query(&ddl).execute(pool).await?;
    Ok(table)
}

/// Load a validated table into the curated table for its contract.
///
/// Only contract-declared columns are loaded; declared columns missing from
/// the file are filled with NULL. Cell values are bound by the declared type
/// using the same coercions the quality validator already checked.
pub async fn load(
    pool: &PgPool,
    contract: &Contract,
    table: &TabularData,
    ingestion_id: Uuid,
    source_sha256: &str,
    batch_size: usize,
) -> sqlx::Result<LoadResult> {
    let curated = ensure_curated_table(pool, contract).await?;

    if table.row_count() == 0 {
        return Ok(LoadResult { table: curated, rows_loaded: 0 });
    }

    let batch_size = batch_size.max(1);
    let loaded_at = Utc::now();

    // Column plan: declared name, rule, and where (if anywhere) the column
    // sits in the incoming file.
    let plan: Vec<(&str, LogicalType, Option<usize>)> = contract
        .columns
        .iter()
        .map(|(name, rule)| (name.as_str(), rule.logical_type, table.column_index(name)))
        .collect();

    let insert_columns: Vec<String> = plan
        .iter()
        .map(|(name, _, _)| quote_ident(name))
        .chain(LINEAGE_COLUMNS.iter().map(|c| c.to_string()))
        .collect();
    let insert_prefix = format!(
        "INSERT INTO {} ({}) ",
        quote_ident(&curated),
        insert_columns.join(", ")
    );

    let conflict_clause = contract.primary_key.as_deref().map(|pk| {
        let updates: Vec<String> = plan
            .iter()
            .map(|(name, _, _)| *name)
            .chain(LINEAGE_COLUMNS.iter().copied())
            .filter(|name| *name != pk)
            .map(|name| format!("{} = EXCLUDED.{}", quote_ident(name), quote_ident(name)))
            .collect();
        format!(" ON CONFLICT ({}) DO UPDATE SET {}", quote_ident(pk), updates.join(", "))
    });

    let mut tx = pool.begin().await?;
    let mut rows_loaded: u64 = 0;

    for chunk in table.rows().chunks(batch_size) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert_prefix);
        builder.push_values(chunk, |mut b, row| {
            for (_, logical_type, idx) in &plan {
                let value = idx.map(|i| &row[i]).unwrap_or(&Value::Null);
                match logical_type {
                    LogicalType::String => b.push_bind(value.coerce_text()),
                    LogicalType::Number => b.push_bind(value.coerce_number()),
                    LogicalType::Boolean => b.push_bind(value.coerce_bool()),
                    LogicalType::Datetime => b.push_bind(value.coerce_timestamp()),
                };
            }
            b.push_bind(ingestion_id);
            b.push_bind(loaded_at);
            b.push_bind(source_sha256.to_string());
        });
        if let Some(ref clause) = conflict_clause {
            builder.push(clause);
        }

        let result = builder.build().execute(&mut *tx).await?;
        rows_loaded += result.rows_affected();
    }

    tx.commit().await?;

    debug!(table = %curated, rows_loaded, %ingestion_id, "curated load committed");
    Ok(LoadResult { table: curated, rows_loaded })
}

/// Most recently loaded curated rows, for preview surfaces.
pub async fn sample(
    pool: &PgPool,
    dataset: &str,
    limit: i64,
) -> sqlx::Result<Vec<serde_json::Value>> {
    let table = curated_table_name(dataset);
    let limit = limit.clamp(1, 200);
    let sql = format!(
        "SELECT row_to_json(t) FROM {} t ORDER BY _loaded_at DESC LIMIT $1",
        quote_ident(&table)
    );
    sqlx::query_scalar(&sql).bind(limit).fetch_all(pool).await
}
