//! Job execution — the retry half of the scheduler.
//!
//! The ticker claims due jobs and runs them here. Every external call is
//! bounded by the configured timeout and classified into success, retryable
//! failure, or permanent failure. Retryable failures go back on the queue
//! with exponential backoff and full jitter; permanent ones are surfaced as
//! `failed` with their error message and never retried. One job's failure
//! never blocks the rest of the tick.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::RngExt;

use crate::db::DbJob;
use crate::emails;
use crate::providers::{DeleteOutcome, SendOutcome};
use crate::state::EngineState;
use crate::types::JobKind;

/// Backoff base (1 minute) and cap (1 hour).
const BACKOFF_BASE_SECS: i64 = 60;
const BACKOFF_CAP_SECS: i64 = 3600;

/// Upper bound on jobs pulled in a single tick. Anything left stays due and
/// is claimed on the next tick.
pub const MAX_JOBS_PER_TICK: i64 = 32;

/// Classified result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    /// Target already in the desired end state — counts as success, no
    /// external side effect happened.
    IdempotentSuccess,
    Retryable(String),
    Permanent(String),
}

/// Deterministic backoff ceiling for the nth retry: 60s doubling per attempt,
/// capped at one hour.
pub fn backoff_ceiling_secs(retry_count: i64) -> i64 {
    let exp = (retry_count - 1).clamp(0, 10) as u32;
    (BACKOFF_BASE_SECS << exp).min(BACKOFF_CAP_SECS)
}

/// Full-jitter backoff: uniform in `[0, ceiling]`.
pub fn backoff_delay(retry_count: i64) -> Duration {
    let ceiling = backoff_ceiling_secs(retry_count);
    let secs = rand::rng().random_range(0..=ceiling);
    Duration::seconds(secs)
}

/// Claim and execute everything due at `now`. Returns how many jobs ran.
pub async fn run_due_jobs(state: &EngineState, now: DateTime<Utc>) -> usize {
    let due = {
        match state.db.lock().claim_due_jobs(&now, MAX_JOBS_PER_TICK) {
            Ok(jobs) => jobs,
            Err(e) => {
                log::warn!("Failed to claim due jobs: {}", e);
                return 0;
            }
        }
    };

    let count = due.len();
    for job in &due {
        execute_job(state, job).await;
    }
    count
}

/// Execute one claimed job and settle its queue state.
pub async fn execute_job(state: &EngineState, job: &DbJob) -> ExecOutcome {
    let outcome = perform(state, job).await;
    settle(state, job, &outcome);
    outcome
}

async fn perform(state: &EngineState, job: &DbJob) -> ExecOutcome {
    let timeout = StdDuration::from_secs(state.config_snapshot().execution_timeout_secs);
    match job.kind {
        JobKind::CalendarCleanup => perform_cleanup(state, job, timeout).await,
        _ => perform_email(state, job, timeout).await,
    }
}

async fn perform_email(state: &EngineState, job: &DbJob, timeout: StdDuration) -> ExecOutcome {
    let meeting = {
        match state.db.lock().get_meeting(&job.meeting_id) {
            Ok(Some(meeting)) => meeting,
            Ok(None) => {
                return ExecOutcome::Permanent("meeting no longer exists".to_string());
            }
            Err(e) => return ExecOutcome::Retryable(format!("meeting lookup failed: {}", e)),
        }
    };

    let Some(to) = meeting.attendee_email.clone() else {
        return ExecOutcome::Permanent("meeting has no attendee email".to_string());
    };
    let Some((subject, body)) = emails::compose(job.kind, &meeting) else {
        return ExecOutcome::Permanent(format!("{} has no email payload", job.kind.as_str()));
    };

    match tokio::time::timeout(timeout, state.email.send(&to, &subject, &body)).await {
        Err(_) => ExecOutcome::Retryable(format!("send timed out after {}s", timeout.as_secs())),
        Ok(SendOutcome::Delivered) => ExecOutcome::Success,
        Ok(SendOutcome::Transient(msg)) => ExecOutcome::Retryable(msg),
        Ok(SendOutcome::Permanent(msg)) => ExecOutcome::Permanent(msg),
    }
}

async fn perform_cleanup(state: &EngineState, job: &DbJob, timeout: StdDuration) -> ExecOutcome {
    let meeting = {
        match state.db.lock().get_meeting(&job.meeting_id) {
            Ok(Some(meeting)) => meeting,
            Ok(None) => {
                // Nothing left to clean up for — the end state holds.
                return ExecOutcome::IdempotentSuccess;
            }
            Err(e) => return ExecOutcome::Retryable(format!("meeting lookup failed: {}", e)),
        }
    };

    let deletion = state
        .calendar
        .delete_event(&job.user_id, &meeting.external_id);
    match tokio::time::timeout(timeout, deletion).await {
        Err(_) => ExecOutcome::Retryable(format!("delete timed out after {}s", timeout.as_secs())),
        Ok(DeleteOutcome::Deleted) => ExecOutcome::Success,
        // Event already gone: the desired end state is reached
        Ok(DeleteOutcome::NotFound) => ExecOutcome::IdempotentSuccess,
        Ok(DeleteOutcome::Transient(msg)) => ExecOutcome::Retryable(msg),
        Ok(DeleteOutcome::Permanent(msg)) => ExecOutcome::Permanent(msg),
    }
}

/// Settle a claimed job's queue state after an attempt.
fn settle(state: &EngineState, job: &DbJob, outcome: &ExecOutcome) {
    let now = Utc::now();
    let max_retries = state.config_snapshot().max_job_retries;
    let db = state.db.lock();

    match outcome {
        ExecOutcome::Success | ExecOutcome::IdempotentSuccess => {
            if let Err(e) = db.mark_job_sent(&job.id, &now) {
                log::warn!("Failed to mark job {} sent: {}", job.id, e);
                return;
            }
            log::info!("Job {} ({}) completed", job.id, job.kind.as_str());

            // An actual deletion may owe the attendee a cancellation notice.
            if job.kind == JobKind::CalendarCleanup && *outcome == ExecOutcome::Success {
                match db.get_user_settings(&job.user_id) {
                    Ok(settings) if settings.notify_calendar_deletions => {
                        if let Err(e) = db.enqueue_job(
                            &job.user_id,
                            &job.meeting_id,
                            JobKind::Cancellation,
                            &now,
                            &now,
                        ) {
                            log::warn!(
                                "Failed to enqueue cancellation notice for {}: {}",
                                job.meeting_id,
                                e
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Failed to load settings for {}: {}", job.user_id, e);
                    }
                }
            }
        }
        ExecOutcome::Retryable(msg) => {
            let next_count = job.retry_count + 1;
            if next_count >= max_retries {
                log::warn!(
                    "Job {} ({}) failed after {} attempts: {}",
                    job.id,
                    job.kind.as_str(),
                    next_count,
                    msg
                );
                if let Err(e) = db.mark_job_failed(&job.id, next_count, msg, &now) {
                    log::warn!("Failed to mark job {} failed: {}", job.id, e);
                }
            } else {
                let delay = backoff_delay(next_count);
                let next_at = now + delay;
                log::warn!(
                    "Job {} attempt {} failed ({}); retrying in {}s",
                    job.id,
                    next_count,
                    msg,
                    delay.num_seconds()
                );
                if let Err(e) = db.release_job_for_retry(&job.id, next_count, &next_at, msg, &now)
                {
                    log::warn!("Failed to requeue job {}: {}", job.id, e);
                }
            }
        }
        ExecOutcome::Permanent(msg) => {
            log::warn!(
                "Job {} ({}) failed permanently: {}",
                job.id,
                job.kind.as_str(),
                msg
            );
            if let Err(e) = db.mark_job_failed(&job.id, job.retry_count, msg, &now) {
                log::warn!("Failed to mark job {} failed: {}", job.id, e);
            }
        }
    }
}
