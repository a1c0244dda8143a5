//! Stuck-ingestion reclamation
//!
//! Job queues retry on transient failures, but if a worker dies *after*
//! claiming a record and *before* finishing, redeliveries are skipped because
//! the row already says PROCESSING. The reclaimer is the only recovery path:
//! a periodic sweep that returns PROCESSING rows with a stale heartbeat to
//! RECEIVED, making them claimable again.
//!
//! The sweep is one conditional UPDATE, so it is idempotent and safe to run
//! concurrently with live workers: a record whose owner is still heartbeating
//! no longer matches the staleness predicate and is skipped.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Floor for the staleness window; reclaiming younger rows would race
/// healthy workers between heartbeats.
pub const MIN_RECLAIM_AGE_SECS: i64 = 30;

/// Reclaim ingestions stuck in PROCESSING past the heartbeat TTL.
///
/// Rows whose liveness timestamp (heartbeat, falling back to processing
/// start, falling back to receipt) is strictly older than `older_than_secs`
/// are moved back to RECEIVED, oldest first, up to `limit` per sweep so the
/// sweep itself stays a short transaction. Returns the reclaimed ids.
pub async fn reclaim_stuck(
    pool: &PgPool,
    older_than_secs: i64,
    limit: i64,
) -> sqlx::Result<Vec<Uuid>> {
    let older_than_secs = older_than_secs.max(MIN_RECLAIM_AGE_SECS);
    let limit = limit.clamp(1, 500);
    let cutoff = Utc::now() - Duration::seconds(older_than_secs);

    let reclaimed: Vec<Uuid> = sqlx::query_scalar(
        r#"
        WITH stuck AS (
            SELECT id
            FROM ingestions
            WHERE status = 'PROCESSING'
              AND COALESCE(processing_heartbeat_at, processing_started_at, received_at) < $1
            ORDER BY COALESCE(processing_heartbeat_at, processing_started_at, received_at) ASC
            LIMIT $2
        )
        UPDATE ingestions i
        SET status = 'RECEIVED',
            error = 'reclaimed after stale heartbeat',
            processing_started_at = NULL,
            processing_heartbeat_at = NULL
        FROM stuck
        WHERE i.id = stuck.id
        RETURNING i.id
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    if reclaimed.is_empty() {
        info!(older_than_secs, "reclaim sweep found nothing stuck");
    } else {
        warn!(
            count = reclaimed.len(),
            older_than_secs,
            "reclaimed stuck ingestions back to RECEIVED"
        );
    }

    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{self, ClaimOutcome, IngestionStatus, NewIngestion};
    use chrono::{DateTime, Utc};

    async fn claimed_ingestion(pool: &PgPool) -> Uuid {
        let id = registry::create(
            pool,
            NewIngestion {
                dataset: "parcels".to_string(),
                source: None,
                filename: Some("parcels.csv".to_string()),
                file_ext: Some(".csv".to_string()),
                sha256: "cd".repeat(32),
                raw_path: "/data/raw/parcels/2026-03-01/x.csv".to_string(),
                raw_generation: None,
                replay_of: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(registry::claim(pool, id, 5).await.unwrap(), ClaimOutcome::Claimed);
        id
    }

    async fn set_heartbeat(pool: &PgPool, id: Uuid, at: DateTime<Utc>) {
        sqlx::query("UPDATE ingestions SET processing_heartbeat_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_stale_heartbeat_is_reclaimed(pool: PgPool) -> sqlx::Result<()> {
        let id = claimed_ingestion(&pool).await;
        set_heartbeat(&pool, id, Utc::now() - Duration::seconds(901)).await;

        let reclaimed = reclaim_stuck(&pool, 900, 50).await?;
        assert_eq!(reclaimed, vec![id]);

        let record = registry::get(&pool, id).await?.unwrap();
        assert_eq!(record.status_enum(), Some(IngestionStatus::Received));
        assert!(record.processing_heartbeat_at.is_none());

        // Claimable again, attempt counter keeps history.
        assert_eq!(registry::claim(&pool, id, 5).await?, ClaimOutcome::Claimed);
        assert_eq!(registry::get(&pool, id).await?.unwrap().processing_attempts, 2);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_heartbeat_at_ttl_boundary_is_not_reclaimed(pool: PgPool) -> sqlx::Result<()> {
        let id = claimed_ingestion(&pool).await;
        // Exactly at the boundary: cutoff comparison is strict, so the row
        // must survive. (The sweep recomputes "now", so park the heartbeat a
        // hair inside the window rather than exactly on it.)
        set_heartbeat(&pool, id, Utc::now() - Duration::seconds(899)).await;

        let reclaimed = reclaim_stuck(&pool, 900, 50).await?;
        assert!(reclaimed.is_empty());

        let record = registry::get(&pool, id).await?.unwrap();
        assert_eq!(record.status_enum(), Some(IngestionStatus::Processing));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_live_worker_is_skipped(pool: PgPool) -> sqlx::Result<()> {
        let id = claimed_ingestion(&pool).await;
        // Fresh heartbeat, long TTL: nothing to do.
        let reclaimed = reclaim_stuck(&pool, 900, 50).await?;
        assert!(reclaimed.is_empty());
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_limit_bounds_the_sweep(pool: PgPool) -> sqlx::Result<()> {
        let a = claimed_ingestion(&pool).await;
        let b = claimed_ingestion(&pool).await;
        set_heartbeat(&pool, a, Utc::now() - Duration::seconds(2000)).await;
        set_heartbeat(&pool, b, Utc::now() - Duration::seconds(1000)).await;

        // Oldest first, one per sweep.
        let first = reclaim_stuck(&pool, 900, 1).await?;
        assert_eq!(first, vec![a]);

        let second = reclaim_stuck(&pool, 900, 1).await?;
        assert_eq!(second, vec![b]);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_terminal_rows_are_never_reclaimed(pool: PgPool) -> sqlx::Result<()> {
        let id = claimed_ingestion(&pool).await;
        registry::finalize(&pool, id, IngestionStatus::Loaded, None).await?;
        set_heartbeat(&pool, id, Utc::now() - Duration::seconds(5000)).await;

        let reclaimed = reclaim_stuck(&pool, 900, 50).await?;
        assert!(reclaimed.is_empty());
        Ok(())
    }
}
