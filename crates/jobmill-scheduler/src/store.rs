//! Schedule persistence store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::schedule::Schedule;

/// Schedule store trait for persistence. One durable record per schedule,
/// written whole on every mutation.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert a new schedule. Fails with [`SchedulerError::DuplicateId`] if
    /// the id already exists.
    async fn insert(&self, schedule: &Schedule) -> Result<(), SchedulerError>;

    /// Overwrite an existing schedule. Fails with
    /// [`SchedulerError::NotFound`] if the id is absent.
    async fn update(&self, schedule: &Schedule) -> Result<(), SchedulerError>;

    /// Load a schedule by id.
    async fn get(&self, id: Uuid) -> Result<Option<Schedule>, SchedulerError>;

    /// List all schedules, oldest first.
    async fn list(&self) -> Result<Vec<Schedule>, SchedulerError>;

    /// Delete a schedule. Fails with [`SchedulerError::NotFound`] if the id
    /// is absent.
    async fn remove(&self, id: Uuid) -> Result<(), SchedulerError>;
}

/// In-memory schedule store for tests and non-durable embedders.
pub struct MemoryScheduleStore {
    schedules: tokio::sync::RwLock<HashMap<Uuid, Schedule>>,
}

impl MemoryScheduleStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            schedules: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn insert(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        let mut schedules = self.schedules.write().await;
        if schedules.contains_key(&schedule.id) {
            return Err(SchedulerError::DuplicateId(schedule.id));
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn update(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        let mut schedules = self.schedules.write().await;
        if !schedules.contains_key(&schedule.id) {
            return Err(SchedulerError::NotFound(schedule.id));
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Schedule>, SchedulerError> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Schedule>, SchedulerError> {
        let schedules = self.schedules.read().await;
        let mut all: Vec<Schedule> = schedules.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn remove(&self, id: Uuid) -> Result<(), SchedulerError> {
        let mut schedules = self.schedules.write().await;
        schedules
            .remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::NotFound(id))
    }
}

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;

-- One durable record per schedule
CREATE TABLE IF NOT EXISTS schedules (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    cron_expression TEXT NOT NULL,
    job_type TEXT NOT NULL,
    payload_template TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_fired_at TEXT,
    run_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

/// SQLite-backed schedule store.
pub struct SqliteScheduleStore {
    conn: Connection,
}

impl SqliteScheduleStore {
    /// Open or create a file-backed store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path).await.map_err(SchedulerError::store)?;
        conn.call(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await
            .map_err(SchedulerError::store)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub async fn in_memory() -> Result<Self, SchedulerError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(SchedulerError::store)?;
        conn.call(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await
            .map_err(SchedulerError::store)?;
        Ok(Self { conn })
    }

    fn schedule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let cron_expression: String = row.get(2)?;
        let job_type: String = row.get(3)?;
        let payload_template: String = row.get(4)?;
        let enabled: bool = row.get(5)?;
        let last_fired_at: Option<String> = row.get(6)?;
        let run_count: i64 = row.get(7)?;
        let created_at: String = row.get(8)?;

        Ok(Schedule {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            name,
            cron_expression,
            job_type,
            payload_template: serde_json::from_str(&payload_template)
                .unwrap_or(serde_json::Value::Null),
            enabled,
            last_fired_at: last_fired_at.as_deref().and_then(parse_ts),
            run_count: run_count as u64,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn write_row(conn: &rusqlite::Connection, schedule: &Schedule) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO schedules
             (id, name, cron_expression, job_type, payload_template, enabled,
              last_fired_at, run_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                schedule.id.to_string(),
                schedule.name,
                schedule.cron_expression,
                schedule.job_type,
                schedule.payload_template.to_string(),
                schedule.enabled,
                schedule.last_fired_at.map(|t| t.to_rfc3339()),
                schedule.run_count as i64,
                schedule.created_at.to_rfc3339(),
            ],
        )
    }

    async fn exists(&self, id: Uuid) -> Result<bool, SchedulerError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT 1 FROM schedules WHERE id = ?1")?;
                Ok(stmt.exists([id.to_string()])?)
            })
            .await
            .map_err(SchedulerError::store)
    }
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn insert(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        if self.exists(schedule.id).await? {
            return Err(SchedulerError::DuplicateId(schedule.id));
        }
        let schedule = schedule.clone();
        self.conn
            .call(move |conn| Ok(Self::write_row(conn, &schedule)?))
            .await
            .map_err(SchedulerError::store)?;
        Ok(())
    }

    async fn update(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        if !self.exists(schedule.id).await? {
            return Err(SchedulerError::NotFound(schedule.id));
        }
        let schedule = schedule.clone();
        self.conn
            .call(move |conn| Ok(Self::write_row(conn, &schedule)?))
            .await
            .map_err(SchedulerError::store)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Schedule>, SchedulerError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, cron_expression, job_type, payload_template,
                            enabled, last_fired_at, run_count, created_at
                     FROM schedules WHERE id = ?1",
                )?;
                let mut rows = stmt.query([id.to_string()])?;
                match rows.next()? {
                    Some(row) => Ok(Some(Self::schedule_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(SchedulerError::store)
    }

    async fn list(&self) -> Result<Vec<Schedule>, SchedulerError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, cron_expression, job_type, payload_template,
                            enabled, last_fired_at, run_count, created_at
                     FROM schedules ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map([], Self::schedule_from_row)?;
                let mut schedules = Vec::new();
                for row in rows {
                    schedules.push(row?);
                }
                Ok(schedules)
            })
            .await
            .map_err(SchedulerError::store)
    }

    async fn remove(&self, id: Uuid) -> Result<(), SchedulerError> {
        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM schedules WHERE id = ?1", [id.to_string()])?)
            })
            .await
            .map_err(SchedulerError::store)?;

        if removed == 0 {
            return Err(SchedulerError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
