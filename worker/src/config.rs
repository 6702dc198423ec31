//! Environment configuration for the worker process.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::domain::session::SessionStateNames;

/// Service name carried on every structured log line.
pub const SERVICE_NAME: &str = "schedule-ingest-worker";

/// Fully resolved worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Database schema pinned as the connection `search_path`.
    pub db_schema: String,
    /// Stable worker identity compared by every ownership guard.
    pub worker_id: String,
    pub lease_timeout: Duration,
    pub lease_heartbeat: Duration,
    pub session_idle_timeout: Duration,
    pub poll_interval: Duration,
    pub summary_threshold: usize,
    pub time_tolerance_minutes: u16,
    /// Idle iterations between idle-log lines after the first.
    pub idle_log_every: u32,
    pub default_schedule_year: Option<i32>,
    pub states: SessionStateNames,
}

/// Configuration loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    MissingVar { name: &'static str },
    #[error("invalid value for {name}: {message}")]
    InvalidVar { name: &'static str, message: String },
    #[error(
        "LEASE_HEARTBEAT_SECONDS ({heartbeat}s) must satisfy 3*heartbeat < LEASE_TIMEOUT_SECONDS ({timeout}s)"
    )]
    LeaseRatio { heartbeat: u64, timeout: u64 },
}

impl WorkerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    /// Load from an arbitrary lookup; tests pass maps instead of real env.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar {
                name: "DATABASE_URL",
            })?;

        let lease_timeout = parse_positive_u64(lookup, "LEASE_TIMEOUT_SECONDS", 300)?;
        let lease_heartbeat = parse_positive_u64(lookup, "LEASE_HEARTBEAT_SECONDS", 10)?;
        if lease_heartbeat * 3 >= lease_timeout {
            return Err(ConfigError::LeaseRatio {
                heartbeat: lease_heartbeat,
                timeout: lease_timeout,
            });
        }

        let states = SessionStateNames {
            pending: state_name(lookup, "PENDING_STATE", "pending")?,
            processing: state_name(lookup, "PROCESSING_STATE", "processing")?,
            done: state_name(lookup, "DONE_STATE", "done")?,
            failed: state_name(lookup, "FAILED_STATE", "failed")?,
        };
        states.validate().map_err(|e| ConfigError::InvalidVar {
            name: "PENDING_STATE",
            message: e.to_string(),
        })?;

        Ok(Self {
            database_url,
            db_schema: lookup("DB_SCHEMA")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "schedule_ingest".to_owned()),
            worker_id: lookup("WORKER_ID")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_worker_id),
            lease_timeout: Duration::from_secs(lease_timeout),
            lease_heartbeat: Duration::from_secs(lease_heartbeat),
            session_idle_timeout: Duration::from_secs(parse_positive_u64(
                lookup,
                "SESSION_IDLE_TIMEOUT_SECONDS",
                25,
            )?),
            poll_interval: Duration::from_secs(parse_positive_u64(
                lookup,
                "WORKER_POLL_SECONDS",
                5,
            )?),
            summary_threshold: parse_positive_u64(lookup, "SUMMARY_THRESHOLD", 3)? as usize,
            time_tolerance_minutes: parse_positive_u64(lookup, "TIME_TOLERANCE_MINUTES", 5)?
                as u16,
            idle_log_every: parse_positive_u64(lookup, "WORKER_IDLE_LOG_EVERY", 12)? as u32,
            default_schedule_year: parse_optional_i32(lookup, "OCR_DEFAULT_YEAR")?,
            states,
        })
    }
}

fn default_worker_id() -> String {
    let host = env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_owned());
    format!("{host}-{}", std::process::id())
}

fn parse_positive_u64(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => {
            let parsed: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name,
                message: format!("{raw:?} is not an integer"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidVar {
                    name,
                    message: "must be > 0".to_owned(),
                });
            }
            Ok(parsed)
        }
    }
}

fn parse_optional_i32(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<i32>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar {
                name,
                message: format!("{raw:?} is not an integer"),
            }),
    }
}

fn state_name(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        None => Ok(default.to_owned()),
        Some(raw) => {
            let value = raw.trim().to_owned();
            if value.is_empty() {
                return Err(ConfigError::InvalidVar {
                    name,
                    message: "must be a non-empty state value".to_owned(),
                });
            }
            Ok(value)
        }
    }
}
