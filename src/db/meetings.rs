use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::*;
use crate::types::{MeetingStatus, RawCalendarEvent, Verdict};

const MEETING_COLUMNS: &str = "id, user_id, external_id, title, start_time, end_time,
        attendee_email, company, revenue, company_size, industry, budget, custom_data,
        status, qualification_reason, matched_rule_id, no_show_reason, no_show_marked_at,
        last_processed, created_at, updated_at";

fn map_meeting_row(row: &Row<'_>) -> Result<DbMeeting, rusqlite::Error> {
    let status_raw: String = row.get(13)?;
    Ok(DbMeeting {
        id: row.get(0)?,
        user_id: row.get(1)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        attendee_email: row.get(6)?,
        company: row.get(7)?,
        revenue: row.get(8)?,
        company_size: row.get(9)?,
        industry: row.get(10)?,
        budget: row.get(11)?,
        custom_data: row.get(12)?,
        status: column_enum(13, status_raw, MeetingStatus::parse)?,
        qualification_reason: row.get(14)?,
        matched_rule_id: row.get(15)?,
        no_show_reason: row.get(16)?,
        no_show_marked_at: row.get(17)?,
        last_processed: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

impl TriageDb {
    // =========================================================================
    // Meetings
    // =========================================================================

    /// Insert a meeting for a calendar event, or refresh the raw attributes of
    /// an already-observed one. Lifecycle fields (status, verdict, no-show
    /// marks) are never touched by a re-sync; only the controller moves those.
    pub fn upsert_meeting_from_event(
        &self,
        user_id: &str,
        event: &RawCalendarEvent,
        now: &DateTime<Utc>,
    ) -> Result<DbMeeting, DbError> {
        let now_str = now.to_rfc3339();

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM meetings WHERE user_id = ?1 AND external_id = ?2",
                params![user_id, event.external_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let id = match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE meetings
                     SET title = ?1, start_time = ?2, end_time = ?3, attendee_email = ?4,
                         company = ?5, revenue = ?6, company_size = ?7, industry = ?8,
                         budget = ?9, custom_data = ?10, updated_at = ?11
                     WHERE id = ?12",
                    params![
                        event.title,
                        event.start_time.to_rfc3339(),
                        event.end_time.to_rfc3339(),
                        event.attendee_email,
                        event.company,
                        event.revenue,
                        event.company_size,
                        event.industry,
                        event.budget,
                        event.custom_data,
                        now_str,
                        id,
                    ],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                self.conn.execute(
                    "INSERT INTO meetings (id, user_id, external_id, title, start_time, end_time,
                         attendee_email, company, revenue, company_size, industry, budget,
                         custom_data, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'pending', ?14, ?14)",
                    params![
                        id,
                        user_id,
                        event.external_id,
                        event.title,
                        event.start_time.to_rfc3339(),
                        event.end_time.to_rfc3339(),
                        event.attendee_email,
                        event.company,
                        event.revenue,
                        event.company_size,
                        event.industry,
                        event.budget,
                        event.custom_data,
                        now_str,
                    ],
                )?;
                id
            }
        };

        self.get_meeting(&id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Look up a single meeting by its ID.
    pub fn get_meeting(&self, id: &str) -> Result<Option<DbMeeting>, DbError> {
        let sql = format!("SELECT {} FROM meetings WHERE id = ?1", MEETING_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], map_meeting_row)?;

        match rows.next() {
            Some(Ok(meeting)) => Ok(Some(meeting)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// Record an evaluation verdict on a still-pending meeting.
    ///
    /// Conditional on `status = 'pending'` so a concurrent transition loses
    /// cleanly; returns false when the guard failed. Appends the transition
    /// audit row and bumps `last_processed`.
    pub fn record_verdict(
        &self,
        meeting_id: &str,
        verdict: &Verdict,
        now: &DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now_str = now.to_rfc3339();
        let to_status = verdict.outcome.as_status();

        self.with_transaction(|db| {
            let affected = db.conn.execute(
                "UPDATE meetings
                 SET status = ?1, qualification_reason = ?2, matched_rule_id = ?3,
                     last_processed = ?4, updated_at = ?4
                 WHERE id = ?5 AND status = 'pending'",
                params![
                    to_status.as_str(),
                    verdict.reason,
                    verdict.matched_rule_id,
                    now_str,
                    meeting_id,
                ],
            )?;

            if affected == 0 {
                return Ok(false);
            }

            db.insert_transition(
                meeting_id,
                MeetingStatus::Pending,
                to_status,
                Some(&verdict.reason),
                &now_str,
            )?;
            Ok(true)
        })
    }

    /// Move a meeting between statuses, conditional on the expected current
    /// status. Returns false when the meeting was not in `from` anymore.
    pub fn set_status(
        &self,
        meeting_id: &str,
        from: MeetingStatus,
        to: MeetingStatus,
        reason: Option<&str>,
        now: &DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now_str = now.to_rfc3339();
        self.with_transaction(|db| {
            let affected = db.conn.execute(
                "UPDATE meetings
                 SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now_str, meeting_id, from.as_str()],
            )?;

            if affected == 0 {
                return Ok(false);
            }

            db.insert_transition(meeting_id, from, to, reason, &now_str)?;
            Ok(true)
        })
    }

    /// Mark a qualified meeting as a no-show. Sets `no_show_marked_at` and the
    /// reason together with the status flip, atomically.
    pub fn mark_no_show(
        &self,
        meeting_id: &str,
        reason: &str,
        now: &DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now_str = now.to_rfc3339();
        self.with_transaction(|db| {
            let affected = db.conn.execute(
                "UPDATE meetings
                 SET status = 'no_show', no_show_reason = ?1, no_show_marked_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3 AND status = 'qualified'",
                params![reason, now_str, meeting_id],
            )?;

            if affected == 0 {
                return Ok(false);
            }

            db.insert_transition(
                meeting_id,
                MeetingStatus::Qualified,
                MeetingStatus::NoShow,
                Some(reason),
                &now_str,
            )?;
            Ok(true)
        })
    }

    /// Explicit operator override: return a meeting to `pending`, clearing the
    /// previous decision so re-evaluation starts from a clean slate.
    pub fn reopen_meeting(
        &self,
        meeting_id: &str,
        from: MeetingStatus,
        now: &DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now_str = now.to_rfc3339();
        self.with_transaction(|db| {
            let affected = db.conn.execute(
                "UPDATE meetings
                 SET status = 'pending', qualification_reason = NULL, matched_rule_id = NULL,
                     no_show_reason = NULL, no_show_marked_at = NULL, updated_at = ?1
                 WHERE id = ?2 AND status = ?3",
                params![now_str, meeting_id, from.as_str()],
            )?;

            if affected == 0 {
                return Ok(false);
            }

            db.insert_transition(
                meeting_id,
                from,
                MeetingStatus::Pending,
                Some("manual reopen"),
                &now_str,
            )?;
            Ok(true)
        })
    }

    /// Qualified meetings whose end time has passed, ready for the
    /// completed sweep.
    pub fn list_elapsed_qualified(&self, now: &DateTime<Utc>) -> Result<Vec<DbMeeting>, DbError> {
        let sql = format!(
            "SELECT {} FROM meetings
             WHERE status = 'qualified' AND end_time <= ?1
             ORDER BY end_time ASC",
            MEETING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now.to_rfc3339()], map_meeting_row)?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Append a status-transition audit row.
    pub fn insert_transition(
        &self,
        meeting_id: &str,
        from: MeetingStatus,
        to: MeetingStatus,
        reason: Option<&str>,
        now: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO meeting_transitions (meeting_id, from_status, to_status, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![meeting_id, from.as_str(), to.as_str(), reason, now],
        )?;
        Ok(())
    }

    /// Whether the meeting ever entered the given status. Used by the metrics
    /// rollup to separate automated decisions from manually reviewed ones.
    pub fn has_transition_to(
        &self,
        meeting_id: &str,
        status: MeetingStatus,
    ) -> Result<bool, DbError> {
        let exists: bool = self
            .conn
            .prepare(
                "SELECT 1 FROM meeting_transitions
                 WHERE meeting_id = ?1 AND to_status = ?2 LIMIT 1",
            )?
            .exists(params![meeting_id, status.as_str()])?;
        Ok(exists)
    }

    /// Distinct user ids with at least one meeting. Drives the weekly rollup.
    pub fn list_user_ids(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT user_id FROM meetings ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::types::VerdictOutcome;
    use chrono::Duration;

    fn sample_event(external_id: &str) -> RawCalendarEvent {
        let start = Utc::now() + Duration::hours(2);
        RawCalendarEvent {
            external_id: external_id.to_string(),
            title: "Intro call — Acme".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(30),
            attendee_email: Some("alice@acme.com".to_string()),
            company: Some("Acme".to_string()),
            revenue: Some(2_000_000.0),
            company_size: Some(250),
            industry: Some("Software".to_string()),
            budget: Some("50000".to_string()),
            custom_data: None,
        }
    }

    #[test]
    fn test_upsert_creates_pending_meeting() {
        let db = test_db();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &Utc::now())
            .expect("upsert");
        assert_eq!(meeting.status, MeetingStatus::Pending);
        assert_eq!(meeting.external_id, "evt-1");
        assert_eq!(meeting.revenue, Some(2_000_000.0));
    }

    #[test]
    fn test_upsert_resync_keeps_status() {
        let db = test_db();
        let now = Utc::now();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &now)
            .expect("first upsert");

        let verdict = Verdict {
            outcome: VerdictOutcome::Qualified,
            matched_rule_id: None,
            reason: "test".to_string(),
        };
        assert!(db.record_verdict(&meeting.id, &verdict, &now).expect("verdict"));

        // Re-sync with a changed title must not reset the status
        let mut event = sample_event("evt-1");
        event.title = "Intro call — Acme (rescheduled)".to_string();
        let resynced = db
            .upsert_meeting_from_event("u1", &event, &Utc::now())
            .expect("second upsert");

        assert_eq!(resynced.id, meeting.id);
        assert_eq!(resynced.status, MeetingStatus::Qualified);
        assert_eq!(resynced.title, "Intro call — Acme (rescheduled)");
    }

    #[test]
    fn test_record_verdict_requires_pending() {
        let db = test_db();
        let now = Utc::now();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &now)
            .expect("upsert");

        let verdict = Verdict {
            outcome: VerdictOutcome::Disqualified,
            matched_rule_id: Some(7),
            reason: "revenue below floor".to_string(),
        };
        assert!(db.record_verdict(&meeting.id, &verdict, &now).expect("first"));

        // Second application must lose the conditional guard
        assert!(!db.record_verdict(&meeting.id, &verdict, &now).expect("second"));

        let persisted = db.get_meeting(&meeting.id).expect("get").expect("exists");
        assert_eq!(persisted.status, MeetingStatus::Disqualified);
        assert_eq!(persisted.matched_rule_id, Some(7));
        assert!(persisted.last_processed.is_some());
    }

    #[test]
    fn test_mark_no_show_sets_fields() {
        let db = test_db();
        let now = Utc::now();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &now)
            .expect("upsert");

        // Not qualified yet — must refuse
        assert!(!db.mark_no_show(&meeting.id, "ghosted", &now).expect("refuse"));

        let verdict = Verdict {
            outcome: VerdictOutcome::Qualified,
            matched_rule_id: None,
            reason: "ok".to_string(),
        };
        db.record_verdict(&meeting.id, &verdict, &now).expect("qualify");

        assert!(db.mark_no_show(&meeting.id, "ghosted", &now).expect("mark"));
        let persisted = db.get_meeting(&meeting.id).expect("get").expect("exists");
        assert_eq!(persisted.status, MeetingStatus::NoShow);
        assert_eq!(persisted.no_show_reason.as_deref(), Some("ghosted"));
        assert!(persisted.no_show_marked_at.is_some());
    }

    #[test]
    fn test_reopen_clears_decision() {
        let db = test_db();
        let now = Utc::now();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &now)
            .expect("upsert");
        let verdict = Verdict {
            outcome: VerdictOutcome::Qualified,
            matched_rule_id: Some(3),
            reason: "ok".to_string(),
        };
        db.record_verdict(&meeting.id, &verdict, &now).expect("qualify");
        db.mark_no_show(&meeting.id, "ghosted", &now).expect("no-show");

        assert!(db
            .reopen_meeting(&meeting.id, MeetingStatus::NoShow, &now)
            .expect("reopen"));

        let persisted = db.get_meeting(&meeting.id).expect("get").expect("exists");
        assert_eq!(persisted.status, MeetingStatus::Pending);
        assert!(persisted.qualification_reason.is_none());
        assert!(persisted.matched_rule_id.is_none());
        assert!(persisted.no_show_marked_at.is_none());
    }

    #[test]
    fn test_elapsed_qualified_sweep_query() {
        let db = test_db();
        let now = Utc::now();

        // One meeting already over, one in the future
        let mut past = sample_event("evt-past");
        past.start_time = now - Duration::hours(2);
        past.end_time = now - Duration::hours(1);
        let past_meeting = db
            .upsert_meeting_from_event("u1", &past, &now)
            .expect("upsert past");

        let future_meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-future"), &now)
            .expect("upsert future");

        let verdict = Verdict {
            outcome: VerdictOutcome::Qualified,
            matched_rule_id: None,
            reason: "ok".to_string(),
        };
        db.record_verdict(&past_meeting.id, &verdict, &now).expect("q1");
        db.record_verdict(&future_meeting.id, &verdict, &now).expect("q2");

        let elapsed = db.list_elapsed_qualified(&now).expect("sweep");
        assert_eq!(elapsed.len(), 1);
        assert_eq!(elapsed[0].id, past_meeting.id);
    }

    #[test]
    fn test_transition_audit_recorded() {
        let db = test_db();
        let now = Utc::now();
        let meeting = db
            .upsert_meeting_from_event("u1", &sample_event("evt-1"), &now)
            .expect("upsert");

        let verdict = Verdict {
            outcome: VerdictOutcome::NeedsReview,
            matched_rule_id: None,
            reason: "no rule matched".to_string(),
        };
        db.record_verdict(&meeting.id, &verdict, &now).expect("verdict");

        assert!(db
            .has_transition_to(&meeting.id, MeetingStatus::NeedsReview)
            .expect("query"));
        assert!(!db
            .has_transition_to(&meeting.id, MeetingStatus::Qualified)
            .expect("query"));
    }
}
