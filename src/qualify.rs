//! Qualification controller — the meeting status state machine.
//!
//! All status movement funnels through here, under the per-meeting lock from
//! `EngineState`. Each transition enqueues its side effects as idempotent
//! intents on the job queue; the intents are safe to emit twice because the
//! queue suppresses duplicate live `(meeting, kind)` pairs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DbMeeting, TriageDb, UserSettings};
use crate::error::EngineError;
use crate::evaluator;
use crate::state::EngineState;
use crate::types::{JobKind, MeetingStatus, Verdict, VerdictOutcome};

/// Human resolution of a meeting held for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Qualify,
    Disqualify,
}

/// Legal edges of the meeting state machine. Everything not listed requires
/// the explicit reopen override.
pub fn can_transition(from: MeetingStatus, to: MeetingStatus) -> bool {
    use MeetingStatus::*;
    matches!(
        (from, to),
        (Pending, Qualified)
            | (Pending, Disqualified)
            | (Pending, NeedsReview)
            | (Qualified, Completed)
            | (Qualified, NoShow)
            | (NeedsReview, Qualified)
            | (NeedsReview, Disqualified)
    )
}

/// Evaluate a pending meeting against its user's rules and apply the verdict,
/// including side-effect intents.
///
/// Only pending meetings are evaluated: decided, reviewed, and terminal
/// meetings never move from here. The meeting's lock is held for the whole
/// transition so a concurrent re-sync cannot race the status update.
pub fn evaluate_and_apply(state: &EngineState, meeting_id: &str) -> Result<Verdict, EngineError> {
    let lock = state.meeting_lock(meeting_id);
    let _guard = lock.lock();
    let now = Utc::now();

    let db = state.db.lock();
    let meeting = db
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))?;

    if meeting.status != MeetingStatus::Pending {
        return Err(EngineError::NotPending(meeting.status));
    }

    let rules = db.list_active_rules(&meeting.user_id)?;
    let verdict = evaluator::evaluate(&meeting, &rules);

    if !db.record_verdict(meeting_id, &verdict, &now)? {
        // Lost the conditional guard despite the lock — treat as a race loss.
        return Err(EngineError::NotPending(meeting.status));
    }

    log::info!(
        "Meeting {} evaluated: {:?} ({})",
        meeting_id,
        verdict.outcome,
        verdict.reason
    );

    let settings = db.get_user_settings(&meeting.user_id)?;
    enqueue_decision_effects(&db, &meeting, verdict.outcome, &settings, &now)?;

    Ok(verdict)
}

/// Resolve a held-for-review meeting by explicit human decision. This is the
/// only way out of `needs_review`.
pub fn resolve_review(
    state: &EngineState,
    meeting_id: &str,
    decision: ReviewDecision,
    reason: &str,
) -> Result<DbMeeting, EngineError> {
    let lock = state.meeting_lock(meeting_id);
    let _guard = lock.lock();
    let now = Utc::now();

    let db = state.db.lock();
    let meeting = db
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))?;

    let to = match decision {
        ReviewDecision::Qualify => MeetingStatus::Qualified,
        ReviewDecision::Disqualify => MeetingStatus::Disqualified,
    };

    if meeting.status != MeetingStatus::NeedsReview
        || !db.set_status(meeting_id, MeetingStatus::NeedsReview, to, Some(reason), &now)?
    {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            to,
        });
    }

    let outcome = match decision {
        ReviewDecision::Qualify => VerdictOutcome::Qualified,
        ReviewDecision::Disqualify => VerdictOutcome::Disqualified,
    };
    let settings = db.get_user_settings(&meeting.user_id)?;
    enqueue_decision_effects(&db, &meeting, outcome, &settings, &now)?;

    db.get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))
}

/// Mark a qualified meeting as a no-show. No email side effect.
pub fn mark_no_show(
    state: &EngineState,
    meeting_id: &str,
    reason: &str,
) -> Result<DbMeeting, EngineError> {
    let lock = state.meeting_lock(meeting_id);
    let _guard = lock.lock();
    let now = Utc::now();

    let db = state.db.lock();
    let meeting = db
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))?;

    if meeting.status != MeetingStatus::Qualified || !db.mark_no_show(meeting_id, reason, &now)? {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            to: MeetingStatus::NoShow,
        });
    }

    db.get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))
}

/// Explicit operator override: return a decided or terminal meeting to
/// `pending`. The meeting is not re-evaluated until asked.
pub fn reopen_meeting(state: &EngineState, meeting_id: &str) -> Result<DbMeeting, EngineError> {
    let lock = state.meeting_lock(meeting_id);
    let _guard = lock.lock();
    let now = Utc::now();

    let db = state.db.lock();
    let meeting = db
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))?;

    if meeting.status == MeetingStatus::Pending
        || !db.reopen_meeting(meeting_id, meeting.status, &now)?
    {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            to: MeetingStatus::Pending,
        });
    }

    db.get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::MeetingNotFound(meeting_id.to_string()))
}

/// Ticker sweep: qualified meetings whose end time has passed are completed
/// and get their follow-up email. Pending meetings are never touched — a
/// meeting that was never qualified cannot silently complete.
pub fn complete_elapsed(state: &EngineState, now: DateTime<Utc>) -> Result<usize, EngineError> {
    let elapsed = { state.db.lock().list_elapsed_qualified(&now)? };

    let mut completed = 0;
    for meeting in elapsed {
        let lock = state.meeting_lock(&meeting.id);
        let _guard = lock.lock();

        let db = state.db.lock();
        if db.set_status(
            &meeting.id,
            MeetingStatus::Qualified,
            MeetingStatus::Completed,
            Some("meeting occurred"),
            &now,
        )? {
            db.enqueue_job(&meeting.user_id, &meeting.id, JobKind::Followup, &now, &now)?;
            completed += 1;
        }
    }

    if completed > 0 {
        log::info!("Completed {} elapsed qualified meeting(s)", completed);
    }
    Ok(completed)
}

/// Enqueue the side-effect intents for a freshly decided meeting.
fn enqueue_decision_effects(
    db: &TriageDb,
    meeting: &DbMeeting,
    outcome: VerdictOutcome,
    settings: &UserSettings,
    now: &DateTime<Utc>,
) -> Result<(), EngineError> {
    match outcome {
        VerdictOutcome::Qualified => {
            db.enqueue_job(&meeting.user_id, &meeting.id, JobKind::Confirmation, now, now)?;

            if let Ok(start) = DateTime::parse_from_rfc3339(&meeting.start_time) {
                let remind_at =
                    start.with_timezone(&Utc) - Duration::minutes(settings.reminder_lead_minutes);
                if remind_at > *now {
                    db.enqueue_job(
                        &meeting.user_id,
                        &meeting.id,
                        JobKind::Reminder,
                        &remind_at,
                        now,
                    )?;
                }
            }
        }
        VerdictOutcome::Disqualified => {
            if settings.auto_delete_disqualified {
                let cleanup_at = *now + Duration::minutes(settings.cleanup_delay_minutes);
                db.enqueue_job(
                    &meeting.user_id,
                    &meeting.id,
                    JobKind::CalendarCleanup,
                    &cleanup_at,
                    now,
                )?;
            }
        }
        VerdictOutcome::NeedsReview => {}
    }
    Ok(())
}
