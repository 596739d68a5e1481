//! Background ticker driving the engine.
//!
//! Every minute: claim and execute due jobs, sweep elapsed qualified meetings
//! to completed, and check the weekly metrics schedule. Also handles:
//! - Sleep/wake detection via time-jump polling
//! - Missed rollups (runs if within a grace period)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::{parse_cron, ScheduleEntry};
use crate::error::EngineError;
use crate::state::EngineState;
use crate::{jobs, metrics, qualify};

/// Poll interval for the ticker loop (1 minute).
const POLL_INTERVAL_SECS: u64 = 60;

/// Time jump threshold to detect sleep/wake (5 minutes).
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Grace period for a missed weekly rollup (24 hours) — catches Monday
/// morning sleep/wake gaps.
const MISSED_ROLLUP_GRACE_PERIOD_SECS: i64 = 86400;

pub struct Ticker {
    state: Arc<EngineState>,
}

impl Ticker {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Start the ticker loop. Runs indefinitely.
    pub async fn run(&self) {
        let mut last_check = Utc::now();

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            // Detect sleep: time jumped more than 5 minutes
            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed rollups",
                    time_jump
                );
                self.check_missed_rollup(now);
            }

            self.tick(now).await;

            last_check = now;
        }
    }

    /// One ticker pass. Public so tests and catch-up paths can drive it with
    /// an explicit clock.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let ran = jobs::run_due_jobs(&self.state, now).await;
        if ran > 0 {
            log::debug!("Executed {} due job(s)", ran);
        }

        if let Err(e) = qualify::complete_elapsed(&self.state, now) {
            log::warn!("Completion sweep failed: {}", e);
        }

        self.check_rollup_schedule(now);
    }

    /// Run the weekly rollup when its scheduled time is due.
    fn check_rollup_schedule(&self, now: DateTime<Utc>) {
        let entry = self.state.config_snapshot().schedules.metrics;
        if !entry.enabled {
            return;
        }

        let last_run = *self.state.last_metrics_run.lock();
        match next_due(&entry, now, last_run) {
            Ok(Some(scheduled)) => self.run_rollup(now, scheduled),
            Ok(None) => {}
            Err(e) => log::warn!("Invalid metrics schedule: {}", e),
        }
    }

    /// After a wake, run a rollup that came due while asleep.
    fn check_missed_rollup(&self, now: DateTime<Utc>) {
        let entry = self.state.config_snapshot().schedules.metrics;
        if !entry.enabled {
            return;
        }

        let last_run = *self.state.last_metrics_run.lock();
        match find_missed(&entry, now, last_run, MISSED_ROLLUP_GRACE_PERIOD_SECS) {
            Ok(Some(scheduled)) => {
                log::info!("Found missed weekly rollup (was due {}), running now", scheduled);
                self.run_rollup(now, scheduled);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Invalid metrics schedule: {}", e),
        }
    }

    fn run_rollup(&self, now: DateTime<Utc>, scheduled: DateTime<Utc>) {
        match metrics::run_weekly_rollup(&self.state, now) {
            Ok(rolled) => {
                log::info!("Weekly metrics rollup complete for {} user(s)", rolled);
                *self.state.last_metrics_run.lock() = Some(scheduled);
            }
            Err(e) => log::warn!("Weekly metrics rollup failed: {}", e),
        }
    }
}

/// Whether the schedule has a trigger due at `now`.
///
/// Matches within a 2-minute window of the scheduled time (so a slow tick or
/// short wake gap doesn't skip a run) and dedupes against the last recorded
/// run. Returns the matched scheduled time so the caller can record it.
pub(crate) fn next_due(
    entry: &ScheduleEntry,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz: Tz = entry
        .timezone
        .parse()
        .map_err(|_| EngineError::Config(format!("Invalid timezone: {}", entry.timezone)))?;

    let now_local = now.with_timezone(&tz);
    let mut scheduled_times = schedule.after(&(now_local - chrono::Duration::minutes(2)));

    if let Some(next_time) = scheduled_times.next() {
        let next_utc = next_time.with_timezone(&Utc);
        let diff = (now - next_utc).num_seconds().abs();

        if diff < 120 {
            if let Some(last) = last_run {
                if (last - next_utc).num_seconds().abs() < 60 {
                    return Ok(None); // Already ran
                }
            }
            return Ok(Some(next_utc));
        }
    }

    Ok(None)
}

/// Find a scheduled time that was missed within the grace period.
pub(crate) fn find_missed(
    entry: &ScheduleEntry,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
    grace_secs: i64,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz: Tz = entry
        .timezone
        .parse()
        .map_err(|_| EngineError::Config(format!("Invalid timezone: {}", entry.timezone)))?;

    let now_local = now.with_timezone(&tz);
    let grace_start = now_local - chrono::Duration::seconds(grace_secs);

    for scheduled in schedule.after(&grace_start) {
        let scheduled_utc = scheduled.with_timezone(&Utc);

        if scheduled_utc > now {
            break;
        }

        if let Some(last) = last_run {
            if last >= scheduled_utc {
                continue; // Already ran
            }
        }

        return Ok(Some(scheduled_utc));
    }

    Ok(None)
}
