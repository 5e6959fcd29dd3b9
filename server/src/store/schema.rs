//! Table definitions, applied idempotently on open

/// DDL statements, executed in order
pub(super) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cmd_id TEXT NOT NULL UNIQUE,
        zone_id INTEGER,
        node_id INTEGER,
        channel TEXT,
        cycle_id INTEGER,
        cmd TEXT NOT NULL,
        params TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'QUEUED' CHECK (status IN (
            'QUEUED', 'SENT', 'ACK', 'DONE', 'NO_EFFECT', 'ERROR',
            'INVALID', 'BUSY', 'TIMEOUT', 'SEND_FAILED'
        )),
        source TEXT NOT NULL,
        request_id TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        sent_at INTEGER,
        ack_at INTEGER,
        failed_at INTEGER,
        finished_at INTEGER,
        error_code TEXT,
        error_message TEXT,
        result_code INTEGER,
        duration_ms INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_commands_status_sent ON commands(status, sent_at)",
    "CREATE INDEX IF NOT EXISTS idx_commands_zone ON commands(zone_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS command_acks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        command_id INTEGER NOT NULL REFERENCES commands(id),
        ack_type TEXT NOT NULL CHECK (ack_type IN ('accepted', 'executed', 'verified', 'error')),
        measured_current REAL,
        measured_flow REAL,
        error_message TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        UNIQUE (command_id, ack_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_overrides (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        command_id INTEGER NOT NULL REFERENCES commands(id),
        from_status TEXT NOT NULL,
        to_status TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS zone_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        zone_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_zone_events_zone ON zone_events(zone_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS pending_alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        zone_id INTEGER,
        source TEXT NOT NULL CHECK (source IN ('biz', 'infra', 'node')),
        code TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'failed', 'dlq')),
        last_error TEXT,
        last_attempt_at INTEGER,
        next_retry_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pending_alerts_due ON pending_alerts(status, next_retry_at, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS pending_alerts_dlq (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        original_id INTEGER NOT NULL,
        zone_id INTEGER,
        source TEXT NOT NULL CHECK (source IN ('biz', 'infra', 'node')),
        code TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        attempts INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'dlq' CHECK (status = 'dlq'),
        last_error TEXT,
        last_attempt_at INTEGER,
        created_at INTEGER NOT NULL,
        moved_to_dlq_at INTEGER NOT NULL,
        replayed_at INTEGER,
        replay_count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pending_alerts_dlq_moved ON pending_alerts_dlq(moved_to_dlq_at)",
    r#"
    CREATE TABLE IF NOT EXISTS pending_status_updates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cmd_id TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN (
            'SENT', 'ACK', 'DONE', 'ERROR', 'INVALID', 'BUSY', 'NO_EFFECT'
        )),
        details TEXT NOT NULL DEFAULT '{}',
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL,
        next_retry_at INTEGER,
        last_error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (cmd_id, status)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pending_status_updates_due ON pending_status_updates(next_retry_at, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS pending_status_updates_dlq (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        original_id INTEGER NOT NULL,
        cmd_id TEXT NOT NULL,
        status TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        retry_count INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        last_error TEXT,
        created_at INTEGER NOT NULL,
        moved_to_dlq_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pending_status_updates_dlq_cmd ON pending_status_updates_dlq(cmd_id)",
];
