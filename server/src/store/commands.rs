//! Queries over `commands`, `command_acks` and `zone_events`

use super::{Command, CommandAck, CommandOverride, ZoneEvent};
use crate::error::Result;
use hydrolink_shared::{AckType, CommandStatus, NewCommand};
use serde_json::Value;
use sqlx::SqliteExecutor;

/// Column values written by a status transition
///
/// In [`update_status_if`] `None` leaves the stored value untouched; in
/// [`override_status_if`] the outcome columns are written as given.
#[derive(Debug, Clone, Default)]
pub struct StatusWrite {
    pub sent_at: Option<i64>,
    pub ack_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_code: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Ack row to append to the log
#[derive(Debug, Clone)]
pub struct AckRecord {
    pub ack_type: AckType,
    pub measured_current: Option<f64>,
    pub measured_flow: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Value,
}

/// Insert a QUEUED command; `None` if `cmd_id` already exists
pub async fn insert<'e, E: SqliteExecutor<'e>>(
    exec: E,
    new: &NewCommand,
    now: i64,
) -> Result<Option<Command>> {
    let params = serde_json::to_string(&new.params)?;

    let row = sqlx::query_as::<_, Command>(
        r#"
        INSERT INTO commands (
            cmd_id, zone_id, node_id, channel, cycle_id, cmd, params,
            status, source, request_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 'QUEUED', ?, ?, ?, ?)
        ON CONFLICT(cmd_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&new.cmd_id)
    .bind(new.zone_id)
    .bind(new.node_id)
    .bind(new.channel.as_deref())
    .bind(new.cycle_id)
    .bind(&new.cmd)
    .bind(params)
    .bind(&new.source)
    .bind(new.request_id.as_deref())
    .bind(now)
    .bind(now)
    .fetch_optional(exec)
    .await?;

    Ok(row)
}

pub async fn find<'e, E: SqliteExecutor<'e>>(exec: E, cmd_id: &str) -> Result<Option<Command>> {
    let row = sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE cmd_id = ?")
        .bind(cmd_id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

/// Conditional status write: applies only while the row is still in `expected`
///
/// Returns the updated row, or `None` when another writer got there first.
pub async fn update_status_if<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    expected: CommandStatus,
    status: CommandStatus,
    write: &StatusWrite,
    now: i64,
) -> Result<Option<Command>> {
    let row = sqlx::query_as::<_, Command>(
        r#"
        UPDATE commands SET
            status = ?,
            updated_at = ?,
            sent_at = COALESCE(?, sent_at),
            ack_at = COALESCE(?, ack_at),
            failed_at = COALESCE(?, failed_at),
            finished_at = COALESCE(?, finished_at),
            error_code = COALESCE(?, error_code),
            error_message = COALESCE(?, error_message),
            result_code = COALESCE(?, result_code),
            duration_ms = COALESCE(?, duration_ms)
        WHERE id = ? AND status = ?
        RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(now)
    .bind(write.sent_at)
    .bind(write.ack_at)
    .bind(write.failed_at)
    .bind(write.finished_at)
    .bind(write.error_code.as_deref())
    .bind(write.error_message.as_deref())
    .bind(write.result_code)
    .bind(write.duration_ms)
    .bind(id)
    .bind(expected.as_str())
    .fetch_optional(exec)
    .await?;

    Ok(row)
}

/// Operator override write, conditional on `expected` like [`update_status_if`]
///
/// Outcome columns are replaced rather than merged, so a command forced into
/// a success status drops the failure fields of its previous outcome.
pub async fn override_status_if<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    expected: CommandStatus,
    status: CommandStatus,
    write: &StatusWrite,
    now: i64,
) -> Result<Option<Command>> {
    let row = sqlx::query_as::<_, Command>(
        r#"
        UPDATE commands SET
            status = ?,
            updated_at = ?,
            sent_at = COALESCE(?, sent_at),
            ack_at = COALESCE(?, ack_at),
            failed_at = ?,
            finished_at = ?,
            error_code = ?,
            error_message = ?,
            result_code = ?,
            duration_ms = ?
        WHERE id = ? AND status = ?
        RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(now)
    .bind(write.sent_at)
    .bind(write.ack_at)
    .bind(write.failed_at)
    .bind(write.finished_at)
    .bind(write.error_code.as_deref())
    .bind(write.error_message.as_deref())
    .bind(write.result_code)
    .bind(write.duration_ms)
    .bind(id)
    .bind(expected.as_str())
    .fetch_optional(exec)
    .await?;

    Ok(row)
}

/// Append an operator override to the audit log
pub async fn insert_override<'e, E: SqliteExecutor<'e>>(
    exec: E,
    command_id: i64,
    from: CommandStatus,
    to: CommandStatus,
    reason: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO command_overrides (command_id, from_status, to_status, reason, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(command_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(reason)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn list_overrides<'e, E: SqliteExecutor<'e>>(
    exec: E,
    command_id: i64,
) -> Result<Vec<CommandOverride>> {
    let rows = sqlx::query_as::<_, CommandOverride>(
        "SELECT * FROM command_overrides WHERE command_id = ? ORDER BY id",
    )
    .bind(command_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// In-flight commands whose dispatch time is older than `cutoff`
///
/// Commands acknowledged before their SENT write landed have no `sent_at`;
/// their creation time stands in for it.
pub async fn find_stale_in_flight<'e, E: SqliteExecutor<'e>>(
    exec: E,
    cutoff: i64,
    limit: u32,
) -> Result<Vec<Command>> {
    let rows = sqlx::query_as::<_, Command>(
        r#"
        SELECT * FROM commands
        WHERE status IN ('SENT', 'ACK')
          AND COALESCE(sent_at, created_at) < ?
        ORDER BY COALESCE(sent_at, created_at) ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(cutoff)
    .bind(i64::from(limit))
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Move a still-stale in-flight command to TIMEOUT
///
/// The WHERE clause repeats the selection predicate, so a command resolved by
/// a concurrent writer since it was selected is left alone (`None`).
pub async fn mark_timed_out<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    cutoff: i64,
    now: i64,
    error_code: &str,
    error_message: &str,
) -> Result<Option<Command>> {
    let row = sqlx::query_as::<_, Command>(
        r#"
        UPDATE commands SET
            status = 'TIMEOUT',
            updated_at = ?1,
            failed_at = ?1,
            finished_at = ?1,
            error_code = ?2,
            error_message = ?3,
            result_code = 1,
            duration_ms = ?1 - COALESCE(sent_at, created_at)
        WHERE id = ?4
          AND status IN ('SENT', 'ACK')
          AND COALESCE(sent_at, created_at) < ?5
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(error_code)
    .bind(error_message)
    .bind(id)
    .bind(cutoff)
    .fetch_optional(exec)
    .await?;

    Ok(row)
}

/// Append an ack; a second ack of the same phase is ignored
///
/// Returns whether a row was written.
pub async fn insert_ack<'e, E: SqliteExecutor<'e>>(
    exec: E,
    command_id: i64,
    ack: &AckRecord,
    now: i64,
) -> Result<bool> {
    let metadata = serde_json::to_string(&ack.metadata)?;

    let result = sqlx::query(
        r#"
        INSERT INTO command_acks (
            command_id, ack_type, measured_current, measured_flow,
            error_message, metadata, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(command_id, ack_type) DO NOTHING
        "#,
    )
    .bind(command_id)
    .bind(ack.ack_type.as_str())
    .bind(ack.measured_current)
    .bind(ack.measured_flow)
    .bind(ack.error_message.as_deref())
    .bind(metadata)
    .bind(now)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_acks<'e, E: SqliteExecutor<'e>>(
    exec: E,
    command_id: i64,
) -> Result<Vec<CommandAck>> {
    let rows = sqlx::query_as::<_, CommandAck>(
        "SELECT * FROM command_acks WHERE command_id = ? ORDER BY id ASC",
    )
    .bind(command_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

pub async fn insert_zone_event<'e, E: SqliteExecutor<'e>>(
    exec: E,
    zone_id: i64,
    event_type: &str,
    payload: &Value,
    now: i64,
) -> Result<()> {
    let payload = serde_json::to_string(payload)?;
    sqlx::query(
        "INSERT INTO zone_events (zone_id, event_type, payload, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(zone_id)
    .bind(event_type)
    .bind(payload)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn list_zone_events<'e, E: SqliteExecutor<'e>>(
    exec: E,
    zone_id: i64,
) -> Result<Vec<ZoneEvent>> {
    let rows = sqlx::query_as::<_, ZoneEvent>(
        "SELECT * FROM zone_events WHERE zone_id = ? ORDER BY id ASC",
    )
    .bind(zone_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}
