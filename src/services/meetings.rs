//! Meeting-facing services: ingestion, re-evaluation, review resolution,
//! no-show marking, and immediate cleanup.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::db::{DbJob, DbMeeting, UserSettings};
use crate::error::EngineError;
use crate::jobs::{self, ExecOutcome};
use crate::qualify::{self, ReviewDecision};
use crate::state::EngineState;
use crate::types::{CleanupSummary, IngestSummary, MeetingStatus, RawCalendarEvent, Verdict};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"));

/// Boundary validation for a raw calendar event. Nothing malformed reaches
/// the evaluator or storage.
fn validate_event(event: &RawCalendarEvent) -> Result<(), EngineError> {
    if event.external_id.trim().is_empty() {
        return Err(EngineError::Validation(
            "externalId must not be empty".to_string(),
        ));
    }
    if event.title.trim().is_empty() {
        return Err(EngineError::Validation("title must not be empty".to_string()));
    }
    if event.end_time <= event.start_time {
        return Err(EngineError::Validation(
            "endTime must be after startTime".to_string(),
        ));
    }
    if let Some(email) = &event.attendee_email {
        if !EMAIL_RE.is_match(email) {
            return Err(EngineError::Validation(format!(
                "attendeeEmail '{}' is not a valid address",
                email
            )));
        }
    }
    Ok(())
}

/// Ingest one raw calendar event for a user.
///
/// New events start `pending` and are evaluated immediately; re-synced events
/// get their raw attributes refreshed but their lifecycle state is left
/// alone. Validation failures reject the event atomically — no partial
/// meeting is persisted.
pub fn ingest_meeting(
    state: &EngineState,
    user_id: &str,
    event: RawCalendarEvent,
) -> Result<DbMeeting, EngineError> {
    if user_id.trim().is_empty() {
        return Err(EngineError::Validation("userId must not be empty".to_string()));
    }
    validate_event(&event)?;

    let meeting = {
        state
            .db
            .lock()
            .upsert_meeting_from_event(user_id, &event, &Utc::now())?
    };

    if meeting.status == MeetingStatus::Pending {
        match qualify::evaluate_and_apply(state, &meeting.id) {
            Ok(_) => {}
            // A concurrent caller got there first; the meeting is decided
            Err(EngineError::NotPending(_)) => {}
            Err(e) => return Err(e),
        }

        return state
            .db
            .lock()
            .get_meeting(&meeting.id)?
            .ok_or_else(|| EngineError::MeetingNotFound(meeting.id.clone()));
    }

    Ok(meeting)
}

/// Pull the provider's sync feed for a window and ingest every event.
/// Per-event failures are logged and counted, never fatal for the sweep.
pub async fn sync_calendar(
    state: &EngineState,
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<IngestSummary, EngineError> {
    let events = state
        .calendar
        .list_events(user_id, from, to)
        .await
        .map_err(|e| EngineError::Transient(e.to_string()))?;

    let mut summary = IngestSummary::default();
    for event in events {
        let external_id = event.external_id.clone();
        match ingest_meeting(state, user_id, event) {
            Ok(_) => summary.ingested += 1,
            Err(e) => {
                log::warn!("Skipping event {} during sync: {}", external_id, e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Calendar sync for {}: {} ingested, {} skipped",
        user_id,
        summary.ingested,
        summary.failed
    );
    Ok(summary)
}

/// Explicit re-evaluation of a pending meeting.
pub fn reevaluate(state: &EngineState, meeting_id: &str) -> Result<Verdict, EngineError> {
    qualify::evaluate_and_apply(state, meeting_id)
}

/// Human resolution of a meeting held for review.
pub fn resolve_review(
    state: &EngineState,
    meeting_id: &str,
    decision: ReviewDecision,
    reason: &str,
) -> Result<DbMeeting, EngineError> {
    qualify::resolve_review(state, meeting_id, decision, reason)
}

/// Mark a qualified meeting as a no-show.
pub fn mark_no_show(
    state: &EngineState,
    meeting_id: &str,
    reason: &str,
) -> Result<DbMeeting, EngineError> {
    qualify::mark_no_show(state, meeting_id, reason)
}

/// Operator override returning a decided meeting to `pending`.
pub fn reopen_meeting(state: &EngineState, meeting_id: &str) -> Result<DbMeeting, EngineError> {
    qualify::reopen_meeting(state, meeting_id)
}

/// Execute all of a user's pending calendar-cleanup jobs immediately,
/// regardless of their scheduled time.
///
/// Idempotent: with nothing pending this is a no-op reporting zero deletions,
/// however often it is called.
pub async fn run_cleanup_now(
    state: &EngineState,
    user_id: &str,
) -> Result<CleanupSummary, EngineError> {
    let claimed = {
        state
            .db
            .lock()
            .claim_pending_cleanup_jobs(user_id, &Utc::now())?
    };

    let mut summary = CleanupSummary::default();
    for job in &claimed {
        match jobs::execute_job(state, job).await {
            ExecOutcome::Success => summary.deleted += 1,
            // Already gone — nothing deleted now, nothing to report
            ExecOutcome::IdempotentSuccess => {}
            ExecOutcome::Retryable(_) | ExecOutcome::Permanent(_) => summary.failed += 1,
        }
    }

    log::info!(
        "Immediate cleanup for {}: {} deleted, {} failed",
        user_id,
        summary.deleted,
        summary.failed
    );
    Ok(summary)
}

/// Failed jobs with their error messages, for operator visibility.
pub fn list_failed_jobs(state: &EngineState, user_id: &str) -> Result<Vec<DbJob>, EngineError> {
    Ok(state.db.lock().list_failed_jobs(user_id)?)
}

/// Validate and persist a user's settings.
pub fn update_user_settings(
    state: &EngineState,
    settings: UserSettings,
) -> Result<(), EngineError> {
    settings.validate().map_err(EngineError::Validation)?;
    state.db.lock().save_user_settings(&settings, &Utc::now())?;
    Ok(())
}
