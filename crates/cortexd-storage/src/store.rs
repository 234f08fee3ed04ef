use crate::error::Result;
use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use cortexd_common::types::{Alert, AlertType, Severity};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    severity INTEGER NOT NULL,
    type INTEGER NOT NULL,
    title TEXT NOT NULL,
    message TEXT,
    metadata TEXT,
    acknowledged INTEGER DEFAULT 0,
    resolved INTEGER DEFAULT 0,
    acknowledged_at INTEGER,
    resolved_at INTEGER,
    resolution TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity);
CREATE INDEX IF NOT EXISTS idx_alerts_acknowledged ON alerts(acknowledged);
";

const SELECT_COLUMNS: &str = "id, timestamp, severity, type, title, message, metadata, \
     acknowledged, resolved, acknowledged_at, resolved_at, resolution";

/// Durable alert storage over a single SQLite database.
///
/// All statements are serialized through one connection mutex; the
/// [`cortexd_alert`](../cortexd_alert/index.html) manager is the single
/// writer in practice.
pub struct AlertStore {
    conn: Mutex<Connection>,
}

impl AlertStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed. Fails when the path is unwritable.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("cannot open alert database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "Alert database initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new alert as a single statement. Duplicate ids fail.
    pub fn insert(&self, alert: &Alert) -> bool {
        match self.try_insert(alert) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(id = %alert.id, error = %e, "Failed to insert alert");
                false
            }
        }
    }

    fn try_insert(&self, alert: &Alert) -> Result<()> {
        let metadata = serde_json::to_string(&alert.metadata)?;
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO alerts (id, timestamp, severity, type, title, message, metadata,
                                 acknowledged, resolved, acknowledged_at, resolved_at, resolution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        stmt.execute(rusqlite::params![
            &alert.id,
            alert.timestamp.timestamp(),
            alert.severity.code(),
            alert.alert_type.code(),
            &alert.title,
            &alert.message,
            metadata,
            alert.acknowledged,
            alert.resolved,
            alert.acknowledged_at.map(|t| t.timestamp()),
            alert.resolved_at.map(|t| t.timestamp()),
            &alert.resolution,
        ])?;
        Ok(())
    }

    /// Update only the mutable fields of an existing alert.
    pub fn update(&self, alert: &Alert) -> bool {
        let result: Result<usize> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn.prepare_cached(
                "UPDATE alerts SET acknowledged = ?1, resolved = ?2,
                     acknowledged_at = ?3, resolved_at = ?4, resolution = ?5
                 WHERE id = ?6",
            )?;
            Ok(stmt.execute(rusqlite::params![
                alert.acknowledged,
                alert.resolved,
                alert.acknowledged_at.map(|t| t.timestamp()),
                alert.resolved_at.map(|t| t.timestamp()),
                &alert.resolution,
                &alert.id,
            ])?)
        })();

        match result {
            Ok(changed) => changed > 0,
            Err(e) => {
                tracing::error!(id = %alert.id, error = %e, "Failed to update alert");
                false
            }
        }
    }

    /// Delete an alert. Returns whether a row was removed.
    pub fn remove(&self, id: &str) -> bool {
        let result: Result<usize> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn.prepare_cached("DELETE FROM alerts WHERE id = ?1")?;
            Ok(stmt.execute(rusqlite::params![id])?)
        })();

        match result {
            Ok(changed) => changed > 0,
            Err(e) => {
                tracing::error!(id, error = %e, "Failed to remove alert");
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        let result: Result<Option<Alert>> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn
                .prepare_cached(&format!("SELECT {SELECT_COLUMNS} FROM alerts WHERE id = ?1"))?;
            match stmt.query_row(rusqlite::params![id], row_to_alert) {
                Ok(alert) => Ok(Some(alert)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })();

        match result {
            Ok(alert) => alert,
            Err(e) => {
                tracing::error!(id, error = %e, "Failed to read alert");
                None
            }
        }
    }

    /// All alerts, newest first.
    pub fn get_all(&self, limit: u64) -> Vec<Alert> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_alerts(
            &format!("SELECT {SELECT_COLUMNS} FROM alerts ORDER BY timestamp DESC LIMIT ?1"),
            rusqlite::params![limit],
        )
    }

    /// Unacknowledged alerts, newest first.
    pub fn get_active(&self) -> Vec<Alert> {
        self.query_alerts(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM alerts WHERE acknowledged = 0 ORDER BY timestamp DESC"
            ),
            rusqlite::params![],
        )
    }

    /// Unacknowledged alerts of the given severity, newest first.
    pub fn get_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.query_alerts(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM alerts WHERE severity = ?1 AND acknowledged = 0
                 ORDER BY timestamp DESC"
            ),
            rusqlite::params![severity.code()],
        )
    }

    /// Unacknowledged alerts of the given type, newest first.
    pub fn get_by_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.query_alerts(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM alerts WHERE type = ?1 AND acknowledged = 0
                 ORDER BY timestamp DESC"
            ),
            rusqlite::params![alert_type.code()],
        )
    }

    pub fn count_active(&self) -> u64 {
        self.query_count("SELECT COUNT(*) FROM alerts WHERE acknowledged = 0", rusqlite::params![])
    }

    pub fn count_by_severity(&self, severity: Severity) -> u64 {
        self.query_count(
            "SELECT COUNT(*) FROM alerts WHERE severity = ?1 AND acknowledged = 0",
            rusqlite::params![severity.code()],
        )
    }

    /// Delete resolved alerts older than `cutoff`. Returns the number
    /// removed.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> u64 {
        let result: Result<usize> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn
                .prepare_cached("DELETE FROM alerts WHERE timestamp < ?1 AND resolved = 1")?;
            Ok(stmt.execute(rusqlite::params![cutoff.timestamp()])?)
        })();

        match result {
            Ok(removed) => removed as u64,
            Err(e) => {
                tracing::error!(error = %e, "Alert cleanup failed");
                0
            }
        }
    }

    fn query_alerts(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Vec<Alert> {
        let result: Result<Vec<Alert>> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params, row_to_alert)?;
            let mut alerts = Vec::new();
            for row in rows {
                alerts.push(row?);
            }
            Ok(alerts)
        })();

        match result {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::error!(error = %e, "Alert query failed");
                Vec::new()
            }
        }
    }

    fn query_count(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> u64 {
        let result: Result<i64> = (|| {
            let conn = self.lock_conn();
            let mut stmt = conn.prepare_cached(sql)?;
            Ok(stmt.query_row(params, |row| row.get(0))?)
        })();

        match result {
            Ok(count) => count as u64,
            Err(e) => {
                tracing::error!(error = %e, "Alert count failed");
                0
            }
        }
    }
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let ts_secs: i64 = row.get(1)?;
    let severity_code: i64 = row.get(2)?;
    let type_code: i64 = row.get(3)?;
    let metadata_str: Option<String> = row.get(6)?;
    let ack_at: Option<i64> = row.get(9)?;
    let res_at: Option<i64> = row.get(10)?;

    // Tolerate unreadable metadata: an empty map beats losing the row.
    let metadata: BTreeMap<String, String> = metadata_str
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    Ok(Alert {
        id: row.get(0)?,
        timestamp: Utc.timestamp_opt(ts_secs, 0).single().unwrap_or_default(),
        severity: Severity::from_code(severity_code),
        alert_type: AlertType::from_code(type_code),
        title: row.get(4)?,
        message: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        metadata,
        acknowledged: row.get(7)?,
        resolved: row.get(8)?,
        acknowledged_at: ack_at.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        resolved_at: res_at.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        resolution: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}
