use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::*;
use crate::types::{JobKind, JobStatus};

const JOB_COLUMNS: &str = "id, user_id, meeting_id, kind, status, scheduled_at, sent_at,
        retry_count, error_message, created_at, updated_at";

fn map_job_row(row: &Row<'_>) -> Result<DbJob, rusqlite::Error> {
    let kind_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    Ok(DbJob {
        id: row.get(0)?,
        user_id: row.get(1)?,
        meeting_id: row.get(2)?,
        kind: column_enum(3, kind_raw, JobKind::parse)?,
        status: column_enum(4, status_raw, JobStatus::parse)?,
        scheduled_at: row.get(5)?,
        sent_at: row.get(6)?,
        retry_count: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl TriageDb {
    // =========================================================================
    // Scheduled jobs
    // =========================================================================

    /// Enqueue a job unless a live one of the same `(meeting, kind)` already
    /// exists. This is the idempotent-intent guard: enqueueing the same intent
    /// twice must not produce a second externally visible effect. A previously
    /// `failed` job does not block a fresh attempt.
    ///
    /// Returns the new job, or None when suppressed as a duplicate.
    pub fn enqueue_job(
        &self,
        user_id: &str,
        meeting_id: &str,
        kind: JobKind,
        scheduled_at: &DateTime<Utc>,
        now: &DateTime<Utc>,
    ) -> Result<Option<DbJob>, DbError> {
        let id = Uuid::new_v4().to_string();
        let affected = self.conn.execute(
            "INSERT INTO jobs (id, user_id, meeting_id, kind, status, scheduled_at,
                               retry_count, created_at, updated_at)
             SELECT ?1, ?2, ?3, ?4, 'pending', ?5, 0, ?6, ?6
             WHERE NOT EXISTS (
                 SELECT 1 FROM jobs
                 WHERE meeting_id = ?3 AND kind = ?4
                   AND status IN ('pending', 'in_progress', 'sent')
             )",
            params![
                id,
                user_id,
                meeting_id,
                kind.as_str(),
                scheduled_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_job(&id)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<DbJob>, DbError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], map_job_row)?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// Claim due pending jobs for execution, oldest first.
    ///
    /// Each claim is a conditional `pending -> in_progress` update; a row that
    /// a concurrent tick claimed first is skipped. At most one in-flight
    /// execution per job, even across overlapping ticks after a crash-restart.
    pub fn claim_due_jobs(&self, now: &DateTime<Utc>, limit: i64) -> Result<Vec<DbJob>, DbError> {
        let candidates: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM jobs
                 WHERE status = 'pending' AND scheduled_at <= ?1
                 ORDER BY scheduled_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now.to_rfc3339(), limit], |row| {
                row.get::<_, String>(0)
            })?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        let mut claimed = Vec::new();
        for id in candidates {
            if self.claim_job(&id, now)? {
                if let Some(job) = self.get_job(&id)? {
                    claimed.push(job);
                }
            }
        }
        Ok(claimed)
    }

    /// Atomically claim one job. Returns false when it was no longer pending.
    pub fn claim_job(&self, job_id: &str, now: &DateTime<Utc>) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE jobs SET status = 'in_progress', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now.to_rfc3339(), job_id],
        )?;
        Ok(affected == 1)
    }

    /// Claim every pending calendar-cleanup job for a user, regardless of its
    /// scheduled time. Backs the immediate-cleanup operation.
    pub fn claim_pending_cleanup_jobs(
        &self,
        user_id: &str,
        now: &DateTime<Utc>,
    ) -> Result<Vec<DbJob>, DbError> {
        let candidates: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM jobs
                 WHERE user_id = ?1 AND kind = 'calendar_cleanup' AND status = 'pending'
                 ORDER BY scheduled_at ASC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        let mut claimed = Vec::new();
        for id in candidates {
            if self.claim_job(&id, now)? {
                if let Some(job) = self.get_job(&id)? {
                    claimed.push(job);
                }
            }
        }
        Ok(claimed)
    }

    /// Terminal success: `sent` with the delivery timestamp.
    pub fn mark_job_sent(&self, job_id: &str, now: &DateTime<Utc>) -> Result<(), DbError> {
        let now_str = now.to_rfc3339();
        self.conn.execute(
            "UPDATE jobs SET status = 'sent', sent_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status = 'in_progress'",
            params![now_str, job_id],
        )?;
        Ok(())
    }

    /// Terminal failure: surfaced with its error message, never retried again.
    pub fn mark_job_failed(
        &self,
        job_id: &str,
        retry_count: i64,
        error: &str,
        now: &DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE jobs SET status = 'failed', retry_count = ?1, error_message = ?2,
                             updated_at = ?3
             WHERE id = ?4 AND status = 'in_progress'",
            params![retry_count, error, now.to_rfc3339(), job_id],
        )?;
        Ok(())
    }

    /// Release a claimed job back to the queue for a later retry.
    pub fn release_job_for_retry(
        &self,
        job_id: &str,
        retry_count: i64,
        next_at: &DateTime<Utc>,
        error: &str,
        now: &DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE jobs SET status = 'pending', retry_count = ?1, scheduled_at = ?2,
                             error_message = ?3, updated_at = ?4
             WHERE id = ?5 AND status = 'in_progress'",
            params![
                retry_count,
                next_at.to_rfc3339(),
                error,
                now.to_rfc3339(),
                job_id,
            ],
        )?;
        Ok(())
    }

    /// Failed jobs for operator visibility, most recent first.
    pub fn list_failed_jobs(&self, user_id: &str) -> Result<Vec<DbJob>, DbError> {
        let sql = format!(
            "SELECT {} FROM jobs
             WHERE user_id = ?1 AND status = 'failed'
             ORDER BY updated_at DESC",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], map_job_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Count of live (pending/in_progress/sent) jobs for a meeting and kind.
    pub fn count_live_jobs(&self, meeting_id: &str, kind: JobKind) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE meeting_id = ?1 AND kind = ?2
               AND status IN ('pending', 'in_progress', 'sent')",
            params![meeting_id, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
