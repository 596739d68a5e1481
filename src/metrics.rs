//! Weekly efficiency rollups.
//!
//! One record per `(user, week)`, recomputed by upsert. Derived entirely from
//! the meetings and transition audit tables — the rollup can be re-run any
//! number of times and lands on the same numbers as long as no meetings moved.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};

use crate::db::DbWeeklyMetrics;
use crate::error::EngineError;
use crate::state::EngineState;

/// Monday 00:00 UTC of the week containing `t`. A meeting belongs to the week
/// containing its start time; `[week_start, week_start + 7d)`.
pub fn week_start_for(t: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = t.weekday().num_days_from_monday() as i64;
    let monday = t.date_naive() - Duration::days(days_from_monday);
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

/// Compute (and persist) the rollup for one user-week.
pub fn compute_week(
    state: &EngineState,
    user_id: &str,
    week_start: DateTime<Utc>,
) -> Result<DbWeeklyMetrics, EngineError> {
    let week_end = week_start + Duration::days(7);
    let start_str = week_start.to_rfc3339();
    let end_str = week_end.to_rfc3339();

    let db = state.db.lock();
    let counts = db.week_counts(user_id, &start_str, &end_str)?;
    let settings = db.get_user_settings(user_id)?;

    let auto_decisions = counts.auto_qualified + counts.auto_disqualified;
    let metrics = DbWeeklyMetrics {
        user_id: user_id.to_string(),
        week_start: start_str,
        week_end: end_str,
        total_meetings: counts.total_meetings,
        auto_qualified: counts.auto_qualified,
        auto_disqualified: counts.auto_disqualified,
        manual_review: counts.manual_review,
        time_spent_grooming_minutes: counts.manual_review
            * settings.time_per_manual_review_minutes,
        time_saved_minutes: auto_decisions * settings.time_per_auto_decision_minutes,
        // Defined as 0, not an error, for an empty week
        automation_accuracy: if counts.total_meetings == 0 {
            0.0
        } else {
            auto_decisions as f64 / counts.total_meetings as f64
        },
    };

    db.upsert_weekly_metrics(&metrics)?;
    Ok(metrics)
}

/// Scheduled entrypoint: roll up the week that just ended, for every user
/// with meetings. Per-user failures are logged and skipped so one user's bad
/// data cannot starve the rest.
pub fn run_weekly_rollup(state: &EngineState, now: DateTime<Utc>) -> Result<usize, EngineError> {
    let users = { state.db.lock().list_user_ids()? };
    let previous_week = week_start_for(now) - Duration::days(7);

    let mut rolled = 0;
    for user_id in users {
        match compute_week(state, &user_id, previous_week) {
            Ok(_) => rolled += 1,
            Err(e) => log::warn!("Weekly rollup failed for {}: {}", user_id, e),
        }
    }
    Ok(rolled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserSettings;
    use crate::state::test_utils::test_state;
    use crate::types::{MeetingStatus, RawCalendarEvent, Verdict, VerdictOutcome};

    fn event_at(external_id: &str, start: DateTime<Utc>) -> RawCalendarEvent {
        RawCalendarEvent {
            external_id: external_id.to_string(),
            title: format!("Meeting {}", external_id),
            start_time: start,
            end_time: start + Duration::minutes(30),
            attendee_email: Some("alice@acme.com".to_string()),
            company: None,
            revenue: Some(1_000_000.0),
            company_size: None,
            industry: None,
            budget: None,
            custom_data: None,
        }
    }

    fn verdict(outcome: VerdictOutcome) -> Verdict {
        Verdict {
            outcome,
            matched_rule_id: None,
            reason: "test".to_string(),
        }
    }

    /// Seed: 2 auto-qualified, 1 auto-disqualified, 1 manual review (resolved
    /// to qualified), 1 still pending — all inside the same week.
    fn seed_week(state: &crate::state::EngineState, week_start: DateTime<Utc>) {
        let db = state.db.lock();
        let now = week_start + Duration::hours(1);

        for (i, outcome) in [
            VerdictOutcome::Qualified,
            VerdictOutcome::Qualified,
            VerdictOutcome::Disqualified,
        ]
        .iter()
        .enumerate()
        {
            let meeting = db
                .upsert_meeting_from_event(
                    "u1",
                    &event_at(&format!("evt-auto-{}", i), week_start + Duration::days(1)),
                    &now,
                )
                .expect("meeting");
            db.record_verdict(&meeting.id, &verdict(*outcome), &now)
                .expect("verdict");
        }

        // Manual review path: needs_review, then human-qualified
        let reviewed = db
            .upsert_meeting_from_event("u1", &event_at("evt-review", week_start + Duration::days(2)), &now)
            .expect("meeting");
        db.record_verdict(&reviewed.id, &verdict(VerdictOutcome::NeedsReview), &now)
            .expect("verdict");
        db.set_status(
            &reviewed.id,
            MeetingStatus::NeedsReview,
            MeetingStatus::Qualified,
            Some("human call"),
            &now,
        )
        .expect("resolve");

        // Still pending — counts toward total only
        db.upsert_meeting_from_event("u1", &event_at("evt-pending", week_start + Duration::days(3)), &now)
            .expect("meeting");
    }

    #[test]
    fn test_week_start_is_monday_midnight() {
        // 2026-02-04 is a Wednesday
        let wednesday = Utc.with_ymd_and_hms(2026, 2, 4, 15, 30, 0).single().expect("ts");
        let start = week_start_for(wednesday);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts"));

        // A Monday maps to itself
        assert_eq!(week_start_for(start), start);
    }

    #[test]
    fn test_compute_week_counts_and_derived_times() {
        let (state, _, _) = test_state();
        let week_start = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");
        seed_week(&state, week_start);

        let metrics = compute_week(&state, "u1", week_start).expect("compute");
        assert_eq!(metrics.total_meetings, 5);
        assert_eq!(metrics.auto_qualified, 2);
        assert_eq!(metrics.auto_disqualified, 1);
        assert_eq!(metrics.manual_review, 1);
        // Defaults: 5 min per auto decision, 8 per manual review
        assert_eq!(metrics.time_saved_minutes, 15);
        assert_eq!(metrics.time_spent_grooming_minutes, 8);
        assert!((metrics.automation_accuracy - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_is_identical_and_single_row() {
        let (state, _, _) = test_state();
        let week_start = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");
        seed_week(&state, week_start);

        let first = compute_week(&state, "u1", week_start).expect("first");
        let second = compute_week(&state, "u1", week_start).expect("second");
        assert_eq!(first, second);

        let rows = state.db.lock().list_weekly_metrics("u1", 10).expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], first);
    }

    #[test]
    fn test_empty_week_accuracy_is_zero() {
        let (state, _, _) = test_state();
        let week_start = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");

        let metrics = compute_week(&state, "u1", week_start).expect("compute");
        assert_eq!(metrics.total_meetings, 0);
        assert_eq!(metrics.automation_accuracy, 0.0);
    }

    #[test]
    fn test_meeting_at_next_week_boundary_excluded() {
        let (state, _, _) = test_state();
        let week_start = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");
        {
            let db = state.db.lock();
            let now = week_start + Duration::hours(1);
            // Starts exactly at week_start + 7d — belongs to the next week
            db.upsert_meeting_from_event("u1", &event_at("evt-edge", week_start + Duration::days(7)), &now)
                .expect("meeting");
        }

        let this_week = compute_week(&state, "u1", week_start).expect("compute");
        assert_eq!(this_week.total_meetings, 0);

        let next_week = compute_week(&state, "u1", week_start + Duration::days(7)).expect("compute");
        assert_eq!(next_week.total_meetings, 1);
    }

    #[test]
    fn test_custom_time_estimates_applied() {
        let (state, _, _) = test_state();
        let week_start = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");
        {
            let db = state.db.lock();
            let mut settings = UserSettings::defaults_for("u1");
            settings.time_per_auto_decision_minutes = 10;
            settings.time_per_manual_review_minutes = 20;
            db.save_user_settings(&settings, &Utc::now()).expect("settings");
        }
        seed_week(&state, week_start);

        let metrics = compute_week(&state, "u1", week_start).expect("compute");
        assert_eq!(metrics.time_saved_minutes, 30);
        assert_eq!(metrics.time_spent_grooming_minutes, 20);
    }

    #[test]
    fn test_rollup_covers_previous_week_for_all_users() {
        let (state, _, _) = test_state();
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 6, 0, 0).single().expect("ts");
        let previous_week = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).single().expect("ts");
        {
            let db = state.db.lock();
            let created = previous_week + Duration::hours(1);
            db.upsert_meeting_from_event("u1", &event_at("evt-a", previous_week + Duration::days(1)), &created)
                .expect("meeting");
            db.upsert_meeting_from_event("u2", &event_at("evt-b", previous_week + Duration::days(2)), &created)
                .expect("meeting");
        }

        let rolled = run_weekly_rollup(&state, now).expect("rollup");
        assert_eq!(rolled, 2);

        let db = state.db.lock();
        for user in ["u1", "u2"] {
            let row = db
                .get_weekly_metrics(user, &previous_week.to_rfc3339())
                .expect("get")
                .expect("row exists");
            assert_eq!(row.total_meetings, 1);
        }
    }
}
