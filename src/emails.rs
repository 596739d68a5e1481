//! Subject/body composition for outbound meeting emails.

use chrono::{DateTime, Utc};

use crate::db::DbMeeting;
use crate::types::JobKind;

/// Compose the subject and body for an email job kind.
///
/// Calendar-cleanup jobs have no email payload; callers only ask for email
/// kinds. Returns None for anything else.
pub fn compose(kind: JobKind, meeting: &DbMeeting) -> Option<(String, String)> {
    let when = format_start(&meeting.start_time);
    match kind {
        JobKind::Confirmation => Some((
            format!("Confirmed: {}", meeting.title),
            format!(
                "Your meeting \"{}\" on {} is confirmed. We look forward to speaking with you.",
                meeting.title, when
            ),
        )),
        JobKind::Reminder => Some((
            format!("Reminder: {}", meeting.title),
            format!(
                "A reminder that \"{}\" starts at {}. See you there.",
                meeting.title, when
            ),
        )),
        JobKind::Followup => Some((
            format!("Thanks for meeting: {}", meeting.title),
            format!(
                "Thank you for joining \"{}\". We'll follow up with next steps shortly.",
                meeting.title
            ),
        )),
        JobKind::Cancellation => Some((
            format!("Cancelled: {}", meeting.title),
            format!(
                "The meeting \"{}\" scheduled for {} has been removed from the calendar.",
                meeting.title, when
            ),
        )),
        JobKind::CalendarCleanup => None,
    }
}

/// Render an RFC 3339 start time for email bodies. Falls back to the raw
/// string when it does not parse — the email still has to go out.
fn format_start(start_time: &str) -> String {
    match DateTime::parse_from_rfc3339(start_time) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M UTC")
            .to_string(),
        Err(_) => start_time.to_string(),
    }
}
