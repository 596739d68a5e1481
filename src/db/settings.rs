use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

impl TriageDb {
    // =========================================================================
    // Per-user settings
    // =========================================================================

    /// Load a user's settings, falling back to defaults when they have never
    /// saved any. Callers get a value, not shared mutable state.
    pub fn get_user_settings(&self, user_id: &str) -> Result<UserSettings, DbError> {
        let result = self.conn.query_row(
            "SELECT user_id, auto_delete_disqualified, notify_calendar_deletions,
                    cleanup_delay_minutes, reminder_lead_minutes,
                    time_per_auto_decision_minutes, time_per_manual_review_minutes
             FROM user_settings
             WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserSettings {
                    user_id: row.get(0)?,
                    auto_delete_disqualified: row.get(1)?,
                    notify_calendar_deletions: row.get(2)?,
                    cleanup_delay_minutes: row.get(3)?,
                    reminder_lead_minutes: row.get(4)?,
                    time_per_auto_decision_minutes: row.get(5)?,
                    time_per_manual_review_minutes: row.get(6)?,
                })
            },
        );

        match result {
            Ok(settings) => Ok(settings),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Ok(UserSettings::defaults_for(user_id))
            }
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    /// Persist settings that already passed boundary validation.
    pub fn save_user_settings(
        &self,
        settings: &UserSettings,
        now: &DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO user_settings
                 (user_id, auto_delete_disqualified, notify_calendar_deletions,
                  cleanup_delay_minutes, reminder_lead_minutes,
                  time_per_auto_decision_minutes, time_per_manual_review_minutes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                 auto_delete_disqualified = excluded.auto_delete_disqualified,
                 notify_calendar_deletions = excluded.notify_calendar_deletions,
                 cleanup_delay_minutes = excluded.cleanup_delay_minutes,
                 reminder_lead_minutes = excluded.reminder_lead_minutes,
                 time_per_auto_decision_minutes = excluded.time_per_auto_decision_minutes,
                 time_per_manual_review_minutes = excluded.time_per_manual_review_minutes,
                 updated_at = excluded.updated_at",
            params![
                settings.user_id,
                settings.auto_delete_disqualified,
                settings.notify_calendar_deletions,
                settings.cleanup_delay_minutes,
                settings.reminder_lead_minutes,
                settings.time_per_auto_decision_minutes,
                settings.time_per_manual_review_minutes,
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    #[test]
    fn test_missing_settings_fall_back_to_defaults() {
        let db = test_db();
        let settings = db.get_user_settings("u1").expect("get");
        assert_eq!(settings, UserSettings::defaults_for("u1"));
    }

    #[test]
    fn test_save_and_reload() {
        let db = test_db();
        let mut settings = UserSettings::defaults_for("u1");
        settings.auto_delete_disqualified = true;
        settings.cleanup_delay_minutes = 5;

        db.save_user_settings(&settings, &Utc::now()).expect("save");
        let reloaded = db.get_user_settings("u1").expect("get");
        assert!(reloaded.auto_delete_disqualified);
        assert_eq!(reloaded.cleanup_delay_minutes, 5);
    }

    #[test]
    fn test_save_is_upsert() {
        let db = test_db();
        let mut settings = UserSettings::defaults_for("u1");
        db.save_user_settings(&settings, &Utc::now()).expect("first");

        settings.notify_calendar_deletions = true;
        db.save_user_settings(&settings, &Utc::now()).expect("second");

        let count: i32 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM user_settings", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
        assert!(db.get_user_settings("u1").expect("get").notify_calendar_deletions);
    }
}
