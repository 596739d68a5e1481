//! Reporting services — weekly efficiency metrics for the shell.

use chrono::{Duration, Utc};

use crate::db::DbWeeklyMetrics;
use crate::error::EngineError;
use crate::metrics;
use crate::state::EngineState;

/// The most recent `weeks` rollups for a user, newest first, the current
/// (partial) week included.
///
/// Each requested week is recomputed on the way out, so callers always see
/// numbers consistent with the meetings table rather than a stale rollup.
pub fn get_weekly_metrics(
    state: &EngineState,
    user_id: &str,
    weeks: usize,
) -> Result<Vec<DbWeeklyMetrics>, EngineError> {
    if user_id.trim().is_empty() {
        return Err(EngineError::Validation("userId must not be empty".to_string()));
    }

    let current = metrics::week_start_for(Utc::now());
    let mut out = Vec::with_capacity(weeks);
    for i in 0..weeks {
        let week_start = current - Duration::weeks(i as i64);
        out.push(metrics::compute_week(state, user_id, week_start)?);
    }
    Ok(out)
}
