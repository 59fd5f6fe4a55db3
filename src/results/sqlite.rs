//! SQLite-backed result store.
//!
//! Single-table persistence for analysis records, upserting on the record id
//! so repeated delivery never duplicates. Timestamps are stored as RFC 3339
//! UTC strings, which compare correctly as text.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::clients::{ResultQuery, ResultStore};
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, DetectionLabel};

/// Result store persisting to a local SQLite database.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS analysis_results (
                id        TEXT PRIMARY KEY,
                camera_id TEXT NOT NULL,
                location  TEXT NOT NULL,
                labels    TEXT NOT NULL,
                video_key TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_camera_time
                ON analysis_results (camera_id, timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn put(&self, record: &AnalysisResult) -> Result<()> {
        let labels = serde_json::to_string(&record.labels)
            .map_err(|e| Error::Storage(format!("label serialization failed: {e}")))?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_results (id, camera_id, location, labels, video_key, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                camera_id = excluded.camera_id,
                location  = excluded.location,
                labels    = excluded.labels,
                video_key = excluded.video_key,
                timestamp = excluded.timestamp",
            params![
                record.id,
                record.camera_id,
                record.location,
                labels,
                record.video_key,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn query(&self, query: &ResultQuery) -> Result<Vec<AnalysisResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, camera_id, location, labels, video_key, timestamp
             FROM analysis_results
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp",
        )?;

        let rows = stmt.query_map(
            params![query.start.to_rfc3339(), query.end.to_rfc3339()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (id, camera_id, location, labels_json, video_key, timestamp) = row?;

            if let Some(camera) = &query.camera_id {
                if camera != &camera_id {
                    continue;
                }
            }
            let labels: Vec<DetectionLabel> = serde_json::from_str(&labels_json)
                .map_err(|e| Error::Storage(format!("corrupt label column for {id}: {e}")))?;
            if let Some(wanted) = &query.label {
                if !labels.iter().any(|l| l.name.eq_ignore_ascii_case(wanted)) {
                    continue;
                }
            }
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| Error::Storage(format!("corrupt timestamp for {id}: {e}")))?
                .with_timezone(&Utc);

            records.push(AnalysisResult {
                id,
                camera_id,
                location,
                labels,
                video_key,
                timestamp,
            });
        }
        Ok(records)
    }
}
