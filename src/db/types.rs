//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{JobKind, JobStatus, MeetingStatus, RuleAction, RuleField, RuleOperator};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Map a stored enum string into its typed form inside a `query_map` closure.
pub(crate) fn column_enum<T>(
    idx: usize,
    raw: String,
    parse: fn(&str) -> Option<T>,
) -> Result<T, rusqlite::Error> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized value: {}", raw).into(),
        )
    })
}

/// A row from the `meetings` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeeting {
    pub id: String,
    pub user_id: String,
    pub external_id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub attendee_email: Option<String>,
    pub company: Option<String>,
    pub revenue: Option<f64>,
    pub company_size: Option<i64>,
    pub industry: Option<String>,
    pub budget: Option<String>,
    /// Free-form attribute matched by `custom` rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
    pub status: MeetingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualification_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_show_reason: Option<String>,
    /// Set iff `status = no_show`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_show_marked_at: Option<String>,
    /// UTC timestamp of the most recent evaluation; monotonically non-decreasing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `qualification_rules` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRule {
    pub id: i64,
    pub user_id: String,
    pub field: RuleField,
    pub operator: RuleOperator,
    pub value: String,
    pub action: RuleAction,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `meeting_transitions` audit table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTransition {
    pub id: i64,
    pub meeting_id: String,
    pub from_status: MeetingStatus,
    pub to_status: MeetingStatus,
    pub reason: Option<String>,
    pub created_at: String,
}

/// A row from the `jobs` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbJob {
    pub id: String,
    pub user_id: String,
    pub meeting_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub scheduled_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    pub retry_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `weekly_metrics` table. One per `(user_id, week_start)`,
/// recomputed by upsert — a materialized view over meetings, never a source
/// of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbWeeklyMetrics {
    pub user_id: String,
    pub week_start: String,
    pub week_end: String,
    pub total_meetings: i64,
    pub auto_qualified: i64,
    pub auto_disqualified: i64,
    pub manual_review: i64,
    pub time_spent_grooming_minutes: i64,
    pub time_saved_minutes: i64,
    pub automation_accuracy: f64,
}

/// Per-user configuration consumed by the controller and scheduler.
/// Loaded from the `user_settings` table; defaults apply when the user has
/// never saved settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserSettings {
    pub user_id: String,
    pub auto_delete_disqualified: bool,
    pub notify_calendar_deletions: bool,
    pub cleanup_delay_minutes: i64,
    pub reminder_lead_minutes: i64,
    pub time_per_auto_decision_minutes: i64,
    pub time_per_manual_review_minutes: i64,
}

impl UserSettings {
    pub fn defaults_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            auto_delete_disqualified: false,
            notify_calendar_deletions: false,
            cleanup_delay_minutes: 30,
            reminder_lead_minutes: 60,
            time_per_auto_decision_minutes: 5,
            time_per_manual_review_minutes: 8,
        }
    }

    /// Boundary validation. Out-of-range values never reach storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if !(0..=1440).contains(&self.cleanup_delay_minutes) {
            return Err(format!(
                "cleanup_delay_minutes must be within [0, 1440], got {}",
                self.cleanup_delay_minutes
            ));
        }
        if self.reminder_lead_minutes < 0 {
            return Err("reminder_lead_minutes must not be negative".to_string());
        }
        if self.time_per_auto_decision_minutes < 0 || self.time_per_manual_review_minutes < 0 {
            return Err("time estimates must not be negative".to_string());
        }
        Ok(())
    }
}
