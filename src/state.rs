//! Shared engine state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::db::TriageDb;
use crate::providers::{CalendarProvider, EmailSender};

/// State shared between the service facade and the background ticker.
///
/// The meeting-lock arena serializes status transitions per meeting id: a
/// concurrent calendar re-sync and a scheduled cleanup can both touch the same
/// meeting, and exactly one of them may move its status at a time. Contention
/// is always scoped to a single user's meetings, so there is no global lock.
pub struct EngineState {
    pub config: RwLock<EngineConfig>,
    pub db: Mutex<TriageDb>,
    meeting_locks: DashMap<String, Arc<Mutex<()>>>,
    pub email: Arc<dyn EmailSender>,
    pub calendar: Arc<dyn CalendarProvider>,
    /// When the weekly metrics rollup last ran on schedule.
    pub last_metrics_run: Mutex<Option<DateTime<Utc>>>,
}

impl EngineState {
    pub fn new(
        config: EngineConfig,
        db: TriageDb,
        email: Arc<dyn EmailSender>,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            db: Mutex::new(db),
            meeting_locks: DashMap::new(),
            email,
            calendar,
            last_metrics_run: Mutex::new(None),
        }
    }

    /// The lock guarding one meeting's status transitions. Must be held for
    /// the duration of a transition's DB mutation, never across external I/O.
    pub fn meeting_lock(&self, meeting_id: &str) -> Arc<Mutex<()>> {
        self.meeting_locks
            .entry(meeting_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Snapshot of the current config, taken under the read lock.
    pub fn config_snapshot(&self) -> EngineConfig {
        self.config.read().clone()
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================
