use rusqlite::{params, Row};

use super::*;

/// Raw per-week counters read from meetings + transitions. The aggregator
/// turns these into a `DbWeeklyMetrics` row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekCounts {
    pub total_meetings: i64,
    pub auto_qualified: i64,
    pub auto_disqualified: i64,
    pub manual_review: i64,
}

fn map_metrics_row(row: &Row<'_>) -> Result<DbWeeklyMetrics, rusqlite::Error> {
    Ok(DbWeeklyMetrics {
        user_id: row.get(0)?,
        week_start: row.get(1)?,
        week_end: row.get(2)?,
        total_meetings: row.get(3)?,
        auto_qualified: row.get(4)?,
        auto_disqualified: row.get(5)?,
        manual_review: row.get(6)?,
        time_spent_grooming_minutes: row.get(7)?,
        time_saved_minutes: row.get(8)?,
        automation_accuracy: row.get(9)?,
    })
}

const METRICS_COLUMNS: &str = "user_id, week_start, week_end, total_meetings, auto_qualified,
        auto_disqualified, manual_review, time_spent_grooming_minutes, time_saved_minutes,
        automation_accuracy";

impl TriageDb {
    // =========================================================================
    // Weekly metrics
    // =========================================================================

    /// Count a user's meetings in `[week_start, week_end)`, bucketed by how
    /// their decision was reached. A meeting that ever passed through
    /// `needs_review` counts as manually reviewed whatever its current status;
    /// automated buckets require a decided status with no review detour.
    pub fn week_counts(
        &self,
        user_id: &str,
        week_start: &str,
        week_end: &str,
    ) -> Result<WeekCounts, DbError> {
        let row = self.conn.query_row(
            "SELECT
                 COUNT(*),
                 SUM(CASE WHEN status IN ('qualified', 'completed', 'no_show')
                          AND NOT EXISTS (
                              SELECT 1 FROM meeting_transitions t
                              WHERE t.meeting_id = meetings.id AND t.to_status = 'needs_review')
                     THEN 1 ELSE 0 END),
                 SUM(CASE WHEN status = 'disqualified'
                          AND NOT EXISTS (
                              SELECT 1 FROM meeting_transitions t
                              WHERE t.meeting_id = meetings.id AND t.to_status = 'needs_review')
                     THEN 1 ELSE 0 END),
                 SUM(CASE WHEN EXISTS (
                              SELECT 1 FROM meeting_transitions t
                              WHERE t.meeting_id = meetings.id AND t.to_status = 'needs_review')
                     THEN 1 ELSE 0 END)
             FROM meetings
             WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3",
            params![user_id, week_start, week_end],
            |row| {
                Ok(WeekCounts {
                    total_meetings: row.get(0)?,
                    auto_qualified: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    auto_disqualified: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    manual_review: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            },
        )?;
        Ok(row)
    }

    /// Write (or overwrite) the rollup for one `(user, week)`. Recomputation
    /// replaces the prior record; there is never more than one row per key.
    pub fn upsert_weekly_metrics(&self, metrics: &DbWeeklyMetrics) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO weekly_metrics
                 (user_id, week_start, week_end, total_meetings, auto_qualified,
                  auto_disqualified, manual_review, time_spent_grooming_minutes,
                  time_saved_minutes, automation_accuracy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id, week_start) DO UPDATE SET
                 week_end = excluded.week_end,
                 total_meetings = excluded.total_meetings,
                 auto_qualified = excluded.auto_qualified,
                 auto_disqualified = excluded.auto_disqualified,
                 manual_review = excluded.manual_review,
                 time_spent_grooming_minutes = excluded.time_spent_grooming_minutes,
                 time_saved_minutes = excluded.time_saved_minutes,
                 automation_accuracy = excluded.automation_accuracy",
            params![
                metrics.user_id,
                metrics.week_start,
                metrics.week_end,
                metrics.total_meetings,
                metrics.auto_qualified,
                metrics.auto_disqualified,
                metrics.manual_review,
                metrics.time_spent_grooming_minutes,
                metrics.time_saved_minutes,
                metrics.automation_accuracy,
            ],
        )?;
        Ok(())
    }

    pub fn get_weekly_metrics(
        &self,
        user_id: &str,
        week_start: &str,
    ) -> Result<Option<DbWeeklyMetrics>, DbError> {
        let sql = format!(
            "SELECT {} FROM weekly_metrics WHERE user_id = ?1 AND week_start = ?2",
            METRICS_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![user_id, week_start], map_metrics_row)?;

        match rows.next() {
            Some(Ok(metrics)) => Ok(Some(metrics)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// Most recent rollups for a user, newest week first.
    pub fn list_weekly_metrics(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<DbWeeklyMetrics>, DbError> {
        let sql = format!(
            "SELECT {} FROM weekly_metrics
             WHERE user_id = ?1
             ORDER BY week_start DESC
             LIMIT ?2",
            METRICS_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit], map_metrics_row)?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row?);
        }
        Ok(metrics)
    }
}
