//! Queries over `pending_status_updates` and `pending_status_updates_dlq`

use super::{DeadLetterStatusUpdate, PendingStatusUpdate};
use crate::error::Result;
use hydrolink_shared::StatusUpdateKind;
use serde_json::Value;
use sqlx::{SqliteConnection, SqliteExecutor};

/// Buffer a status event; `None` if `(cmd_id, status)` is already buffered
pub async fn insert<'e, E: SqliteExecutor<'e>>(
    exec: E,
    cmd_id: &str,
    status: StatusUpdateKind,
    details: &Value,
    max_attempts: u32,
    now: i64,
) -> Result<Option<PendingStatusUpdate>> {
    let details = serde_json::to_string(details)?;

    let row = sqlx::query_as::<_, PendingStatusUpdate>(
        r#"
        INSERT INTO pending_status_updates (
            cmd_id, status, details, retry_count, max_attempts, created_at, updated_at
        )
        VALUES (?, ?, ?, 0, ?, ?, ?)
        ON CONFLICT(cmd_id, status) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(cmd_id)
    .bind(status.as_str())
    .bind(details)
    .bind(i64::from(max_attempts))
    .bind(now)
    .bind(now)
    .fetch_optional(exec)
    .await?;

    Ok(row)
}

pub async fn list_for_command<'e, E: SqliteExecutor<'e>>(
    exec: E,
    cmd_id: &str,
) -> Result<Vec<PendingStatusUpdate>> {
    let rows = sqlx::query_as::<_, PendingStatusUpdate>(
        "SELECT * FROM pending_status_updates WHERE cmd_id = ? ORDER BY id ASC",
    )
    .bind(cmd_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Rows whose retry time has come, oldest first
pub async fn list_due<'e, E: SqliteExecutor<'e>>(
    exec: E,
    now: i64,
    limit: u32,
) -> Result<Vec<PendingStatusUpdate>> {
    let rows = sqlx::query_as::<_, PendingStatusUpdate>(
        r#"
        SELECT * FROM pending_status_updates
        WHERE next_retry_at IS NULL OR next_retry_at <= ?
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

/// Hide a due row from other appliers until `lease_until`
pub async fn claim<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    now: i64,
    lease_until: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pending_status_updates SET next_retry_at = ?1, updated_at = ?2
        WHERE id = ?3 AND (next_retry_at IS NULL OR next_retry_at <= ?2)
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
    let result = sqlx::query("DELETE FROM pending_status_updates WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Count a failed apply, guarded by the retry count the caller observed
pub async fn record_failure<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    expected_retry_count: i64,
    error: &str,
    now: i64,
    next_retry_at: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pending_status_updates SET
            retry_count = retry_count + 1,
            last_error = ?1,
            next_retry_at = ?2,
            updated_at = ?3
        WHERE id = ?4 AND retry_count = ?5
        "#,
    )
    .bind(error)
    .bind(next_retry_at)
    .bind(now)
    .bind(id)
    .bind(expected_retry_count)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Copy a live row into the DLQ, then delete it (caller's transaction)
pub async fn move_to_dlq(conn: &mut SqliteConnection, id: i64, now: i64) -> Result<bool> {
    let copied = sqlx::query(
        r#"
        INSERT INTO pending_status_updates_dlq (
            original_id, cmd_id, status, details, retry_count, max_attempts,
            last_error, created_at, moved_to_dlq_at
        )
        SELECT id, cmd_id, status, details, retry_count, max_attempts,
               last_error, created_at, ?
        FROM pending_status_updates WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if copied.rows_affected() == 0 {
        return Ok(false);
    }

    let deleted = sqlx::query("DELETE FROM pending_status_updates WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(deleted.rows_affected() == 1)
}

/// Most recently dead-lettered rows first
pub async fn list_dlq<'e, E: SqliteExecutor<'e>>(
    exec: E,
    limit: u32,
) -> Result<Vec<DeadLetterStatusUpdate>> {
    let rows = sqlx::query_as::<_, DeadLetterStatusUpdate>(
        "SELECT * FROM pending_status_updates_dlq ORDER BY moved_to_dlq_at DESC, id DESC LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

pub async fn count_live<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_status_updates")
        .fetch_one(exec)
        .await?;
    Ok(count)
}

pub async fn count_dlq<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_status_updates_dlq")
        .fetch_one(exec)
        .await?;
    Ok(count)
}
