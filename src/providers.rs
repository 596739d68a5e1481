//! External provider adapters.
//!
//! The engine talks to the outside world through two narrow traits: an email
//! sender and a calendar provider. OAuth, HTTP plumbing, and rendering live in
//! the shell; the engine only sees classified outcomes so the retry loop can
//! decide between backoff, permanent failure, and idempotent success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::RawCalendarEvent;

/// Result of an email delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Provider hiccup (timeout, 4xx throttle, greylisting) — retry later.
    Transient(String),
    /// Provider confirms delivery can never succeed (invalid mailbox).
    Permanent(String),
}

/// Result of a calendar event deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Event already gone — the desired end state is reached.
    NotFound,
    Transient(String),
    Permanent(String),
}

#[derive(Debug, Error)]
#[error("calendar provider error: {0}")]
pub struct ProviderError(pub String);

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> SendOutcome;
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn delete_event(&self, user_id: &str, external_id: &str) -> DeleteOutcome;

    /// Raw sync feed for a user's calendar in a time range.
    async fn list_events(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawCalendarEvent>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Dry-run adapters
// ---------------------------------------------------------------------------

/// Email adapter that logs instead of sending. Used by the standalone daemon
/// when no real sender is wired in, so the queue can be exercised end to end.
pub struct DryRunMailer;

#[async_trait]
impl EmailSender for DryRunMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> SendOutcome {
        log::info!("dry-run email to {}: {}", to, subject);
        SendOutcome::Delivered
    }
}

/// Calendar adapter that logs instead of deleting and serves an empty feed.
pub struct DryRunCalendar;

#[async_trait]
impl CalendarProvider for DryRunCalendar {
    async fn delete_event(&self, user_id: &str, external_id: &str) -> DeleteOutcome {
        log::info!("dry-run calendar delete for {}: {}", user_id, external_id);
        DeleteOutcome::Deleted
    }

    async fn list_events(
        &self,
        _user_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<RawCalendarEvent>, ProviderError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
