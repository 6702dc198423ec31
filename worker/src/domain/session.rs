//! Capture-session domain values shared between lifecycle and persistence.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Owner of a schedule; the upstream bot's numeric user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session this worker currently holds the lease on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}

/// One ordered screenshot of a session. Read-only for this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureImage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sequence: i32,
    pub blob_key: String,
    pub created_at: DateTime<Utc>,
}

/// Result of an ownership-guarded session update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseGuard {
    /// The guarded update touched the row; the lease is still ours.
    Held,
    /// Zero rows matched; another worker reclaimed the session.
    Lost,
}

/// Configurable state names, aliasable for test schemas.
///
/// Values are embedded into SQL as quoted literals (so enum-typed state
/// columns coerce them), which is why they are validated to a conservative
/// identifier alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateNames {
    pub pending: String,
    pub processing: String,
    pub done: String,
    pub failed: String,
}

/// Raised when a configured state name cannot be embedded safely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("state name {value:?} must be non-empty lowercase [a-z0-9_]")]
pub struct InvalidStateName {
    pub value: String,
}

impl SessionStateNames {
    pub fn validate(&self) -> Result<(), InvalidStateName> {
        for value in [&self.pending, &self.processing, &self.done, &self.failed] {
            let valid = !value.is_empty()
                && value
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
            if !valid {
                return Err(InvalidStateName {
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for SessionStateNames {
    fn default() -> Self {
        Self {
            pending: "pending".to_owned(),
            processing: "processing".to_owned(),
            done: "done".to_owned(),
            failed: "failed".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn default_state_names_validate() {
        assert!(SessionStateNames::default().validate().is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("Pending")]
    #[case("done; DROP TABLE capture_session")]
    fn hostile_or_empty_state_names_are_rejected(#[case] value: &str) {
        let states = SessionStateNames {
            pending: value.to_owned(),
            ..SessionStateNames::default()
        };
        assert!(states.validate().is_err());
    }
}
