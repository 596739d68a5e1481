//! Core domain types shared across the engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Meeting lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a meeting.
///
/// `no_show`, `completed` and `disqualified` are terminal: the only way back
/// is the explicit reopen override, never automatic re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Pending,
    Qualified,
    Disqualified,
    NeedsReview,
    NoShow,
    Completed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "pending",
            MeetingStatus::Qualified => "qualified",
            MeetingStatus::Disqualified => "disqualified",
            MeetingStatus::NeedsReview => "needs_review",
            MeetingStatus::NoShow => "no_show",
            MeetingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MeetingStatus::Pending),
            "qualified" => Some(MeetingStatus::Qualified),
            "disqualified" => Some(MeetingStatus::Disqualified),
            "needs_review" => Some(MeetingStatus::NeedsReview),
            "no_show" => Some(MeetingStatus::NoShow),
            "completed" => Some(MeetingStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MeetingStatus::Disqualified | MeetingStatus::NoShow | MeetingStatus::Completed
        )
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Qualification rules
// ---------------------------------------------------------------------------

/// Meeting attribute a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Revenue,
    CompanySize,
    Industry,
    Budget,
    Custom,
}

impl RuleField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleField::Revenue => "revenue",
            RuleField::CompanySize => "company_size",
            RuleField::Industry => "industry",
            RuleField::Budget => "budget",
            RuleField::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revenue" => Some(RuleField::Revenue),
            "company_size" => Some(RuleField::CompanySize),
            "industry" => Some(RuleField::Industry),
            "budget" => Some(RuleField::Budget),
            "custom" => Some(RuleField::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Gte,
    Lte,
    Eq,
    Ne,
    Contains,
    NotContains,
}

impl RuleOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleOperator::Gte => "gte",
            RuleOperator::Lte => "lte",
            RuleOperator::Eq => "eq",
            RuleOperator::Ne => "ne",
            RuleOperator::Contains => "contains",
            RuleOperator::NotContains => "not_contains",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(RuleOperator::Gte),
            "lte" => Some(RuleOperator::Lte),
            "eq" => Some(RuleOperator::Eq),
            "ne" => Some(RuleOperator::Ne),
            "contains" => Some(RuleOperator::Contains),
            "not_contains" => Some(RuleOperator::NotContains),
            _ => None,
        }
    }
}

/// What a matching rule means for the meeting. Stored explicitly on the rule
/// so evaluation never has to infer polarity from the rule's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Qualify,
    Disqualify,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Qualify => "qualify",
            RuleAction::Disqualify => "disqualify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qualify" => Some(RuleAction::Qualify),
            "disqualify" => Some(RuleAction::Disqualify),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Qualified,
    Disqualified,
    NeedsReview,
}

impl VerdictOutcome {
    pub fn as_status(&self) -> MeetingStatus {
        match self {
            VerdictOutcome::Qualified => MeetingStatus::Qualified,
            VerdictOutcome::Disqualified => MeetingStatus::Disqualified,
            VerdictOutcome::NeedsReview => MeetingStatus::NeedsReview,
        }
    }
}

/// The result of evaluating a meeting against a user's rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub outcome: VerdictOutcome,
    /// The rule that produced the outcome, when one matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<i64>,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// What a scheduled job does when executed. Email kinds go through the email
/// sender; `calendar_cleanup` goes through the calendar provider, under the
/// same queue/retry contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Confirmation,
    Reminder,
    Followup,
    Cancellation,
    CalendarCleanup,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Confirmation => "confirmation",
            JobKind::Reminder => "reminder",
            JobKind::Followup => "followup",
            JobKind::Cancellation => "cancellation",
            JobKind::CalendarCleanup => "calendar_cleanup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmation" => Some(JobKind::Confirmation),
            "reminder" => Some(JobKind::Reminder),
            "followup" => Some(JobKind::Followup),
            "cancellation" => Some(JobKind::Cancellation),
            "calendar_cleanup" => Some(JobKind::CalendarCleanup),
            _ => None,
        }
    }

    pub fn is_email(&self) -> bool {
        !matches!(self, JobKind::CalendarCleanup)
    }
}

/// Queue status of a job. `in_progress` is the claim state a ticker takes
/// before performing the external action; externally visible transitions only
/// move forward (`pending -> sent` or `pending -> failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "sent" => Some(JobStatus::Sent),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar sync feed
// ---------------------------------------------------------------------------

/// A raw calendar event as delivered by the provider's sync feed, before
/// validation. Prospect attributes come from the booking form attached to the
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCalendarEvent {
    pub external_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendee_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    /// Free-form attribute matched by `custom` rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
}

/// Outcome summary of a calendar sync pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub ingested: usize,
    pub failed: usize,
}

/// Outcome summary of an immediate cleanup run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub deleted: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MeetingStatus::Pending,
            MeetingStatus::Qualified,
            MeetingStatus::Disqualified,
            MeetingStatus::NeedsReview,
            MeetingStatus::NoShow,
            MeetingStatus::Completed,
        ] {
            assert_eq!(MeetingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MeetingStatus::parse("archived"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(MeetingStatus::NoShow.is_terminal());
        assert!(MeetingStatus::Completed.is_terminal());
        assert!(MeetingStatus::Disqualified.is_terminal());
        assert!(!MeetingStatus::Pending.is_terminal());
        assert!(!MeetingStatus::NeedsReview.is_terminal());
    }

    #[test]
    fn test_job_kind_email_split() {
        assert!(JobKind::Confirmation.is_email());
        assert!(JobKind::Cancellation.is_email());
        assert!(!JobKind::CalendarCleanup.is_email());
    }
}
