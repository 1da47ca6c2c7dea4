//! Job persistence store.
//!
//! The store is the single source of truth for job state. Every successful
//! mutation is durable before the call returns; the in-memory queue is only a
//! rebuildable index over it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobPatch, JobPriority, JobStatus};

/// Filter for [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs with this status.
    pub status: Option<JobStatus>,
    /// Only jobs of this type.
    pub job_type: Option<String>,
    /// Only jobs created at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only jobs created before this time.
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of jobs returned.
    pub limit: Option<usize>,
    /// Number of jobs to skip.
    pub offset: Option<usize>,
}

impl JobFilter {
    /// Filter by status only.
    pub fn by_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    fn accepts(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(ref job_type) = self.job_type {
            if &job.job_type != job_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if job.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if job.created_at >= until {
                return false;
            }
        }
        true
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    fn add(&mut self, status: JobStatus, n: u64) {
        match status {
            JobStatus::Pending => self.pending += n,
            JobStatus::Running => self.running += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
            JobStatus::Cancelled => self.cancelled += n,
        }
    }
}

/// Job store trait for persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with [`QueueError::DuplicateId`] if the id
    /// already exists.
    async fn insert(&self, job: &Job) -> Result<(), QueueError>;

    /// Apply a patch to an existing job and return the updated document.
    /// Fails with [`QueueError::NotFound`] if the id is absent.
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, QueueError>;

    /// Compare-and-set: apply the patch only if the current status equals
    /// `from`. Returns `Ok(None)` on a status mismatch (somebody else won the
    /// race, or the job was cancelled meanwhile).
    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        patch: JobPatch,
    ) -> Result<Option<Job>, QueueError>;

    /// Load a job by id.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// List jobs matching a filter, newest first.
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError>;

    /// Count jobs per status.
    async fn counts(&self) -> Result<StatusCounts, QueueError>;

    /// Reset jobs left `Running` by an abnormal shutdown back to `Pending`.
    /// Returns the number of jobs recovered.
    async fn recover_interrupted(&self) -> Result<u64, QueueError>;
}

/// In-memory job store for tests and embedders that don't need durability.
pub struct MemoryJobStore {
    jobs: tokio::sync::RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            jobs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::DuplicateId(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        patch.apply(job);
        Ok(job.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        patch: JobPatch,
    ) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.status != from {
            return Ok(None);
        }
        patch.apply(job);
        Ok(Some(job.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs.values().filter(|j| filter.accepts(j)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0);
        let matched: Vec<Job> = matched
            .into_iter()
            .skip(offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matched)
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }

    async fn recover_interrupted(&self) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.write().await;
        let mut recovered = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.started_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;

-- One durable record per job
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    priority INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    error TEXT,
    result TEXT
);

-- Indexes for lookup by status and priority-then-creation ordering
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_type ON jobs(job_type);
CREATE INDEX IF NOT EXISTS idx_jobs_order ON jobs(priority DESC, created_at ASC);
"#;

/// SQLite-backed job store. Single-statement mutations; the bundled SQLite
/// flushes each write before the call returns.
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Open or create a file-backed store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path).await.map_err(QueueError::store)?;
        conn.call(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await
            .map_err(QueueError::store)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub async fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(QueueError::store)?;
        conn.call(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await
            .map_err(QueueError::store)?;
        Ok(Self { conn })
    }

    fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let job_type: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let priority: i64 = row.get(3)?;
        let status: String = row.get(4)?;
        let attempts: u32 = row.get(5)?;
        let max_attempts: u32 = row.get(6)?;
        let created_at: String = row.get(7)?;
        let started_at: Option<String> = row.get(8)?;
        let completed_at: Option<String> = row.get(9)?;
        let error: Option<String> = row.get(10)?;
        let result: Option<String> = row.get(11)?;

        Ok(Job {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            job_type,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            priority: JobPriority::from_i64(priority),
            status: JobStatus::parse(&status).unwrap_or_default(),
            attempts,
            max_attempts,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
            started_at: started_at.as_deref().and_then(parse_ts),
            completed_at: completed_at.as_deref().and_then(parse_ts),
            error,
            result: result.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        })
    }

    fn write_row(conn: &rusqlite::Connection, job: &Job) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO jobs
             (id, job_type, payload, priority, status, attempts, max_attempts,
              created_at, started_at, completed_at, error, result)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id.to_string(),
                job.job_type,
                job.payload.to_string(),
                job.priority.as_i64(),
                job.status.as_str(),
                job.attempts,
                job.max_attempts,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.error,
                job.result.as_ref().map(|v| v.to_string()),
            ],
        )
    }

    fn read_row(conn: &rusqlite::Connection, id: Uuid) -> rusqlite::Result<Option<Job>> {
        let mut stmt = conn.prepare(
            "SELECT id, job_type, payload, priority, status, attempts, max_attempts,
                    created_at, started_at, completed_at, error, result
             FROM jobs WHERE id = ?1",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::job_from_row(row)?)),
            None => Ok(None),
        }
    }
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let job = job.clone();
        let id = job.id;
        let inserted = self
            .conn
            .call(move |conn| {
                let exists = {
                    let mut stmt = conn.prepare("SELECT 1 FROM jobs WHERE id = ?1")?;
                    stmt.exists([job.id.to_string()])?
                };
                if exists {
                    return Ok(false);
                }
                Self::write_row(conn, &job)?;
                Ok(true)
            })
            .await
            .map_err(QueueError::store)?;

        if !inserted {
            return Err(QueueError::DuplicateId(id));
        }
        debug!("Inserted job {}", id);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, QueueError> {
        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let job = Self::read_row(&tx, id)?;
                let job = match job {
                    Some(mut job) => {
                        patch.apply(&mut job);
                        Self::write_row(&tx, &job)?;
                        Some(job)
                    }
                    None => None,
                };
                tx.commit()?;
                Ok(job)
            })
            .await
            .map_err(QueueError::store)?;

        updated.ok_or(QueueError::NotFound(id))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        patch: JobPatch,
    ) -> Result<Option<Job>, QueueError> {
        // found: whether the id exists at all; inner Option: CAS outcome.
        let (found, job) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let job = Self::read_row(&tx, id)?;
                let out = match job {
                    None => (false, None),
                    Some(job) if job.status != from => (true, None),
                    Some(mut job) => {
                        patch.apply(&mut job);
                        Self::write_row(&tx, &job)?;
                        (true, Some(job))
                    }
                };
                tx.commit()?;
                Ok(out)
            })
            .await
            .map_err(QueueError::store)?;

        if !found {
            return Err(QueueError::NotFound(id));
        }
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        self.conn
            .call(move |conn| Ok(Self::read_row(conn, id)?))
            .await
            .map_err(QueueError::store)
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        self.conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, job_type, payload, priority, status, attempts, max_attempts,
                            created_at, started_at, completed_at, error, result
                     FROM jobs WHERE 1=1",
                );
                let mut args: Vec<rusqlite::types::Value> = Vec::new();

                if let Some(status) = filter.status {
                    sql.push_str(" AND status = ?");
                    args.push(status.as_str().to_string().into());
                }
                if let Some(job_type) = filter.job_type {
                    sql.push_str(" AND job_type = ?");
                    args.push(job_type.into());
                }
                if let Some(since) = filter.since {
                    sql.push_str(" AND created_at >= ?");
                    args.push(since.to_rfc3339().into());
                }
                if let Some(until) = filter.until {
                    sql.push_str(" AND created_at < ?");
                    args.push(until.to_rfc3339().into());
                }
                sql.push_str(" ORDER BY created_at DESC");
                sql.push_str(" LIMIT ? OFFSET ?");
                args.push((filter.limit.map(|l| l as i64).unwrap_or(-1)).into());
                args.push((filter.offset.unwrap_or(0) as i64).into());

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(args), Self::job_from_row)?;
                let mut jobs = Vec::new();
                for row in rows {
                    jobs.push(row?);
                }
                Ok(jobs)
            })
            .await
            .map_err(QueueError::store)
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                let mut counts = StatusCounts::default();
                for row in rows {
                    let (status, n) = row?;
                    if let Some(status) = JobStatus::parse(&status) {
                        counts.add(status, n as u64);
                    }
                }
                Ok(counts)
            })
            .await
            .map_err(QueueError::store)
    }

    async fn recover_interrupted(&self) -> Result<u64, QueueError> {
        let recovered = self
            .conn
            .call(|conn| {
                let changed = conn.execute(
                    "UPDATE jobs SET status = 'pending', started_at = NULL
                     WHERE status = 'running'",
                    [],
                )?;
                Ok(changed as u64)
            })
            .await
            .map_err(QueueError::store)?;

        if recovered > 0 {
            debug!("Recovered {} interrupted jobs to pending", recovered);
        }
        Ok(recovered)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
