//! Engine configuration.
//!
//! Loaded once from `~/.meetgate/config.json` at startup. The surface is a
//! closed set of typed keys — unknown or malformed keys are rejected at parse
//! time rather than passed through as untyped blobs.

use std::path::PathBuf;

use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default ceiling on retries before a job is marked failed.
pub const DEFAULT_MAX_JOB_RETRIES: i64 = 5;

/// Default bound on a single external execution call, in seconds.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_max_job_retries")]
    pub max_job_retries: i64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default)]
    pub schedules: Schedules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Schedules {
    #[serde(default = "Schedules::default_metrics_entry")]
    pub metrics: ScheduleEntry,
}

/// One cron-driven schedule with its timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl Schedules {
    fn default_metrics_entry() -> ScheduleEntry {
        // Monday 06:00 — roll up the week that just ended
        ScheduleEntry {
            enabled: true,
            cron: "0 6 * * 1".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            metrics: Self::default_metrics_entry(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_job_retries: DEFAULT_MAX_JOB_RETRIES,
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT_SECS,
            schedules: Schedules::default(),
        }
    }
}

fn default_max_job_retries() -> i64 {
    DEFAULT_MAX_JOB_RETRIES
}

fn default_execution_timeout_secs() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_SECS
}

/// Resolve the config path: `~/.meetgate/config.json`.
pub fn config_path() -> Result<PathBuf, EngineError> {
    let home = dirs::home_dir()
        .ok_or_else(|| EngineError::Config("home directory not found".to_string()))?;
    Ok(home.join(".meetgate").join("config.json"))
}

/// Load the engine config, falling back to defaults when no file exists.
/// A present-but-malformed file is an error, not a silent default.
pub fn load_config() -> Result<EngineConfig, EngineError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::Config(format!("invalid config {}: {}", path.display(), e)))
}

/// Parse a 5-field cron expression.
///
/// The cron crate expects 6 fields (with seconds); we prepend "0".
pub fn parse_cron(expr: &str) -> Result<Schedule, EngineError> {
    let full_expr = format!("0 {}", expr);

    full_expr
        .parse::<Schedule>()
        .map_err(|e| EngineError::Config(format!("Invalid cron expression '{}': {}", expr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_job_retries, 5);
        assert_eq!(config.execution_timeout_secs, 30);
        assert!(config.schedules.metrics.enabled);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"maxJobRetries": 3}"#).expect("parse");
        assert_eq!(config.max_job_retries, 3);
        assert_eq!(config.execution_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<EngineConfig, _> =
            serde_json::from_str(r#"{"maxJobRetries": 3, "turboMode": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cron_weekly() {
        assert!(parse_cron("0 6 * * 1").is_ok());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
    }
}
