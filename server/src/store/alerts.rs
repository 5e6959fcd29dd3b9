//! Queries over `pending_alerts` and `pending_alerts_dlq`

use super::{DeadLetterAlert, PendingAlert};
use crate::error::Result;
use hydrolink_shared::NewAlert;
use sqlx::{SqliteConnection, SqliteExecutor};

pub async fn insert<'e, E: SqliteExecutor<'e>>(
    exec: E,
    alert: &NewAlert,
    max_attempts: u32,
    now: i64,
) -> Result<PendingAlert> {
    let details = serde_json::to_string(&alert.details)?;

    let row = sqlx::query_as::<_, PendingAlert>(
        r#"
        INSERT INTO pending_alerts (
            zone_id, source, code, alert_type, details,
            attempts, max_attempts, status, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 0, ?, 'pending', ?, ?)
        RETURNING *
        "#,
    )
    .bind(alert.zone_id)
    .bind(alert.source.as_str())
    .bind(&alert.code)
    .bind(&alert.alert_type)
    .bind(details)
    .bind(i64::from(max_attempts))
    .bind(now)
    .bind(now)
    .fetch_one(exec)
    .await?;

    Ok(row)
}

pub async fn find<'e, E: SqliteExecutor<'e>>(exec: E, id: i64) -> Result<Option<PendingAlert>> {
    let row = sqlx::query_as::<_, PendingAlert>("SELECT * FROM pending_alerts WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

/// Return `failed` rows whose backoff has elapsed to `pending`
pub async fn promote_due<'e, E: SqliteExecutor<'e>>(exec: E, now: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE pending_alerts SET status = 'pending', updated_at = ?1
        WHERE status = 'failed' AND next_retry_at <= ?1
        "#,
    )
    .bind(now)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Eligible pending rows, oldest first
pub async fn list_due<'e, E: SqliteExecutor<'e>>(
    exec: E,
    now: i64,
    limit: u32,
) -> Result<Vec<PendingAlert>> {
    let rows = sqlx::query_as::<_, PendingAlert>(
        r#"
        SELECT * FROM pending_alerts
        WHERE status = 'pending'
          AND (next_retry_at IS NULL OR next_retry_at <= ?)
        ORDER BY created_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(now)
    .bind(i64::from(limit))
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Hide an eligible row from other workers until `lease_until`
///
/// Returns false if another worker claimed it first.
pub async fn claim<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    now: i64,
    lease_until: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pending_alerts SET next_retry_at = ?1, updated_at = ?2
        WHERE id = ?3
          AND status = 'pending'
          AND (next_retry_at IS NULL OR next_retry_at <= ?2)
        "#,
    )
    .bind(lease_until)
    .bind(now)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete<'e, E: SqliteExecutor<'e>>(exec: E, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM pending_alerts WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Count a failed attempt, guarded by the attempt count the caller observed
pub async fn record_failure<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    expected_attempts: i64,
    error: &str,
    now: i64,
    next_retry_at: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pending_alerts SET
            attempts = attempts + 1,
            status = 'failed',
            last_error = ?1,
            last_attempt_at = ?2,
            next_retry_at = ?3,
            updated_at = ?2
        WHERE id = ?4 AND attempts = ?5 AND status IN ('pending', 'failed')
        "#,
    )
    .bind(error)
    .bind(now)
    .bind(next_retry_at)
    .bind(id)
    .bind(expected_attempts)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Copy a live row into the DLQ, then delete it
///
/// Must run inside the caller's transaction so the row is never in both
/// tables, nor in neither.
pub async fn move_to_dlq(conn: &mut SqliteConnection, id: i64, now: i64) -> Result<bool> {
    let copied = sqlx::query(
        r#"
        INSERT INTO pending_alerts_dlq (
            original_id, zone_id, source, code, alert_type, details,
            attempts, max_attempts, status, last_error, last_attempt_at,
            created_at, moved_to_dlq_at
        )
        SELECT id, zone_id, source, code, alert_type, details,
               attempts, max_attempts, 'dlq', last_error, last_attempt_at,
               created_at, ?
        FROM pending_alerts WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if copied.rows_affected() == 0 {
        return Ok(false);
    }

    let deleted = sqlx::query("DELETE FROM pending_alerts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(deleted.rows_affected() == 1)
}

/// Most recently dead-lettered rows first
pub async fn list_dlq<'e, E: SqliteExecutor<'e>>(
    exec: E,
    limit: u32,
) -> Result<Vec<DeadLetterAlert>> {
    let rows = sqlx::query_as::<_, DeadLetterAlert>(
        "SELECT * FROM pending_alerts_dlq ORDER BY moved_to_dlq_at DESC, id DESC LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Never-replayed DLQ rows moved at or before `moved_before`, oldest first
pub async fn list_replayable<'e, E: SqliteExecutor<'e>>(
    exec: E,
    moved_before: i64,
    limit: u32,
) -> Result<Vec<DeadLetterAlert>> {
    let rows = sqlx::query_as::<_, DeadLetterAlert>(
        r#"
        SELECT * FROM pending_alerts_dlq
        WHERE replayed_at IS NULL AND moved_to_dlq_at <= ?
        ORDER BY moved_to_dlq_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(moved_before)
    .bind(i64::from(limit))
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Stamp a DLQ row as replayed; false if another replayer got there first
pub async fn mark_replayed<'e, E: SqliteExecutor<'e>>(exec: E, dlq_id: i64, now: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pending_alerts_dlq SET replayed_at = ?, replay_count = replay_count + 1
        WHERE id = ? AND replayed_at IS NULL
        "#,
    )
    .bind(now)
    .bind(dlq_id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Insert a fresh pending row copied from a DLQ row, attempts reset to zero
pub async fn insert_from_dlq<'e, E: SqliteExecutor<'e>>(
    exec: E,
    dlq_id: i64,
    now: i64,
) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pending_alerts (
            zone_id, source, code, alert_type, details,
            attempts, max_attempts, status, created_at, updated_at
        )
        SELECT zone_id, source, code, alert_type, details,
               0, max_attempts, 'pending', ?1, ?1
        FROM pending_alerts_dlq WHERE id = ?2
        RETURNING id
        "#,
    )
    .bind(now)
    .bind(dlq_id)
    .fetch_optional(exec)
    .await?;
    Ok(id)
}

pub async fn count_live<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_alerts")
        .fetch_one(exec)
        .await?;
    Ok(count)
}

pub async fn count_dlq<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_alerts_dlq")
        .fetch_one(exec)
        .await?;
    Ok(count)
}
