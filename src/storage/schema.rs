//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS analysis_log (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            severity TEXT NOT NULL,
            rule_score REAL NOT NULL,
            scorer_score REAL NOT NULL,
            combined_score REAL NOT NULL,
            confidence REAL NOT NULL,
            attack_detected INTEGER NOT NULL,
            packet_count INTEGER NOT NULL,
            attack_mode TEXT NOT NULL,
            record_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS heartbeats (
            id INTEGER PRIMARY KEY,
            entry_id INTEGER,
            value REAL NOT NULL,
            client_timestamp TEXT NOT NULL,
            received_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS event_log (
            id INTEGER PRIMARY KEY,
            event_type TEXT NOT NULL,
            message TEXT NOT NULL,
            attack_mode TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS state_snapshots (
            id INTEGER PRIMARY KEY,
            reason TEXT NOT NULL,
            attack_mode TEXT NOT NULL,
            snapshot_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_analysis_created ON analysis_log(created_at);
        CREATE INDEX IF NOT EXISTS idx_event_created ON event_log(created_at);
        CREATE INDEX IF NOT EXISTS idx_snapshot_created ON state_snapshots(created_at);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
