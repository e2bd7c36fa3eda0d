//! SQLite storage layer -- append-only analysis, heartbeat, event, and
//! snapshot logs.

pub mod schema;

use crate::detect::AnalysisRecord;
use crate::heartbeat::HeartbeatEntry;
use crate::traffic::AttackMode;
use anyhow::{Context, Result};
use chrono::Utc;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::Serialize;
use std::path::Path;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: impl AsRef<Path>) -> Result<Pool> {
    let path = path.as_ref();
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database: {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Kinds of rows in `event_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ClientUpdate,
    AttackDetected,
    ClientDisconnected,
    ModeChanged,
    ManualSnapshot,
    ClientStarted,
    ClientManuallyStopped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ClientUpdate => "CLIENT_UPDATE",
            EventKind::AttackDetected => "ATTACK_DETECTED",
            EventKind::ClientDisconnected => "CLIENT_DISCONNECTED",
            EventKind::ModeChanged => "MODE_CHANGED",
            EventKind::ManualSnapshot => "MANUAL_SNAPSHOT",
            EventKind::ClientStarted => "CLIENT_STARTED",
            EventKind::ClientManuallyStopped => "CLIENT_MANUALLY_STOPPED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub event_type: String,
    pub message: String,
    pub attack_mode: String,
    pub created_at: String,
}

/// Append an analysis record. Records are never updated.
pub fn save_analysis(pool: &Pool, record: &AnalysisRecord, mode: AttackMode) -> Result<()> {
    let conn = pool.get()?;
    let record_json = serde_json::to_string(record)?;

    conn.execute(
        "INSERT INTO analysis_log (id, label, severity, rule_score, scorer_score,
             combined_score, confidence, attack_detected, packet_count, attack_mode,
             record_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id.to_string(),
            record.label.as_str(),
            record.severity.to_string(),
            record.rule_score,
            record.scorer_score,
            record.combined_score,
            record.confidence,
            record.attack_detected,
            record.packet_count as i64,
            mode.as_str(),
            record_json,
            record.timestamp.to_rfc3339(),
        ],
    )
    .context("Failed to insert analysis record")?;

    Ok(())
}

/// Most recent analysis records, newest first.
pub fn recent_analyses(pool: &Pool, limit: usize) -> Result<Vec<AnalysisRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT record_json FROM analysis_log ORDER BY rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for r in rows {
        let json = r?;
        records.push(serde_json::from_str(&json).context("corrupt analysis_log row")?);
    }
    Ok(records)
}

pub fn count_analyses(pool: &Pool) -> Result<i64> {
    let conn = pool.get()?;
    Ok(conn.query_row("SELECT COUNT(*) FROM analysis_log", [], |row| row.get(0))?)
}

/// Store one `/update` body. Returns the number of rows written.
pub fn save_heartbeats(pool: &Pool, entries: &[HeartbeatEntry]) -> Result<usize> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO heartbeats (entry_id, value, client_timestamp, received_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let received_at = Utc::now().to_rfc3339();
        for e in entries {
            stmt.execute(params![e.id, e.value, e.client_timestamp, received_at])?;
        }
    }
    tx.commit().context("Failed to commit heartbeats")?;
    Ok(entries.len())
}

pub fn log_event(pool: &Pool, kind: EventKind, message: &str, mode: AttackMode) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO event_log (event_type, message, attack_mode, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![kind.as_str(), message, mode.as_str(), Utc::now().to_rfc3339()],
    )
    .context("Failed to insert event")?;
    Ok(())
}

/// Most recent events, newest first.
pub fn recent_events(pool: &Pool, limit: usize) -> Result<Vec<EventRow>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, event_type, message, attack_mode, created_at
         FROM event_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok(EventRow {
            id: row.get(0)?,
            event_type: row.get(1)?,
            message: row.get(2)?,
            attack_mode: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;

    let mut events = Vec::new();
    for r in rows {
        events.push(r?);
    }
    Ok(events)
}

/// Persist a point-in-time snapshot of the monitor state. Returns the row id.
pub fn save_snapshot(
    pool: &Pool,
    reason: &str,
    mode: AttackMode,
    snapshot: &serde_json::Value,
) -> Result<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO state_snapshots (reason, attack_mode, snapshot_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            reason,
            mode.as_str(),
            snapshot.to_string(),
            Utc::now().to_rfc3339()
        ],
    )
    .context("Failed to insert state snapshot")?;
    Ok(conn.last_insert_rowid())
}

pub fn count_snapshots(pool: &Pool) -> Result<i64> {
    let conn = pool.get()?;
    Ok(conn.query_row("SELECT COUNT(*) FROM state_snapshots", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AnalysisRecord, Verdict};

    fn pool() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = open_pool(dir.path().join("test.db")).unwrap();
        (dir, pool)
    }

    #[test]
    fn test_analysis_roundtrip_newest_first() {
        let (_dir, pool) = pool();
        let first = AnalysisRecord::insufficient_data(3);
        let second = AnalysisRecord::insufficient_data(7);
        save_analysis(&pool, &first, AttackMode::Normal).unwrap();
        save_analysis(&pool, &second, AttackMode::PortScan).unwrap();

        let rows = recent_analyses(&pool, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second.id);
        assert_eq!(rows[1].label, Verdict::InsufficientData);
        assert_eq!(count_analyses(&pool).unwrap(), 2);
        assert_eq!(recent_analyses(&pool, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_analysis_ids_are_unique() {
        let (_dir, pool) = pool();
        let rec = AnalysisRecord::insufficient_data(1);
        save_analysis(&pool, &rec, AttackMode::Normal).unwrap();
        assert!(save_analysis(&pool, &rec, AttackMode::Normal).is_err());
    }

    #[test]
    fn test_heartbeats_and_events() {
        let (_dir, pool) = pool();
        let entries = vec![
            HeartbeatEntry {
                id: Some(1),
                value: 12.5,
                client_timestamp: "2024-01-01T00:00:00".to_string(),
            },
            HeartbeatEntry {
                id: None,
                value: 99.0,
                client_timestamp: "2024-01-01T00:00:01".to_string(),
            },
        ];
        assert_eq!(save_heartbeats(&pool, &entries).unwrap(), 2);

        log_event(&pool, EventKind::ClientUpdate, "2 entries", AttackMode::Normal).unwrap();
        log_event(&pool, EventKind::AttackDetected, "syn_flood", AttackMode::SynFlood).unwrap();

        let events = recent_events(&pool, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "ATTACK_DETECTED");
        assert_eq!(events[0].attack_mode, "syn_flood");
        assert_eq!(events[1].event_type, "CLIENT_UPDATE");
    }

    #[test]
    fn test_snapshot_is_stored() {
        let (_dir, pool) = pool();
        let id = save_snapshot(
            &pool,
            "manual",
            AttackMode::Normal,
            &serde_json::json!({"total_packets": 10}),
        )
        .unwrap();
        assert!(id > 0);
        assert_eq!(count_snapshots(&pool).unwrap(), 1);
    }
}
