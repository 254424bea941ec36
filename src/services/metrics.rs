use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS build_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    project_id TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    chunks INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_build_log_timestamp ON build_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_build_log_project ON build_log(project_id);
"#;

/// Index build history. Write failures are logged, never returned.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record_build(&self, project_id: &str, latency_ms: u64, chunks: usize, success: bool) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        if let Err(e) = conn.execute(
            "INSERT INTO build_log (timestamp, project_id, latency_ms, chunks, success)
             VALUES (datetime('now'), ?1, ?2, ?3, ?4)",
            params![project_id, latency_ms as i64, chunks as i64, success as i32],
        ) {
            warn!(error = %e, "failed to record build metrics");
        }
    }

    /// Aggregate over the last `retention_days`, optionally for one project.
    pub fn summary(&self, retention_days: u32, project_id: Option<&str>) -> BuildSummary {
        let Ok(conn) = self.conn.lock() else {
            return BuildSummary::default();
        };
        let query = format!(
            r#"
            SELECT
                COUNT(*),
                COALESCE(AVG(latency_ms), 0),
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(MAX(CASE WHEN success = 1 THEN chunks END), 0)
            FROM build_log
            WHERE timestamp >= datetime('now', '-{} days')
              AND (?1 IS NULL OR project_id = ?1)
            "#,
            retention_days
        );

        conn.query_row(&query, params![project_id], |row| {
            Ok(BuildSummary {
                total_builds: row.get::<_, i64>(0)? as u64,
                avg_latency_ms: row.get::<_, f64>(1)? as u64,
                failed_builds: row.get::<_, i64>(2)? as u64,
                max_chunks: row.get::<_, i64>(3)? as u64,
            })
        })
        .unwrap_or_default()
    }

    pub fn cleanup(&self, retention_days: u32) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let query = format!(
            "DELETE FROM build_log WHERE timestamp < datetime('now', '-{} days')",
            retention_days
        );
        if let Err(e) = conn.execute(&query, []) {
            warn!(error = %e, "failed to clean up build metrics");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSummary {
    pub total_builds: u64,
    pub failed_builds: u64,
    pub avg_latency_ms: u64,
    pub max_chunks: u64,
}
