//! Port for immutable schedule-version history writes.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::session::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by version repository adapters.
    pub enum VersionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "version repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "version repository query failed: {message}",
    }
}

/// A candidate version row for one processed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduleVersion {
    pub user_id: UserId,
    pub schedule_date: NaiveDate,
    pub session_id: Uuid,
    /// Canonical payload bytes exactly as hashed.
    pub payload: String,
    pub payload_hash: String,
}

/// Classified result of one version write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionWriteOutcome {
    /// A new immutable version row was inserted.
    Created { version: i32 },
    /// The latest stored version already carries this payload hash.
    Unchanged { version: i32 },
    /// The insert conflicted; a retry of this session already wrote its row.
    AlreadyExisted { version: i32 },
}

impl VersionWriteOutcome {
    pub fn version(self) -> i32 {
        match self {
            Self::Created { version }
            | Self::Unchanged { version }
            | Self::AlreadyExisted { version } => version,
        }
    }
}

/// Port serializing version inserts per `(user_id, schedule_date)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Insert the next version unless the payload hash is unchanged.
    async fn record_version(
        &self,
        version: NewScheduleVersion,
    ) -> Result<VersionWriteOutcome, VersionRepositoryError>;
}

/// Fixture implementation reporting every payload as version one.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureVersionRepository;

#[async_trait]
impl VersionRepository for FixtureVersionRepository {
    async fn record_version(
        &self,
        _version: NewScheduleVersion,
    ) -> Result<VersionWriteOutcome, VersionRepositoryError> {
        Ok(VersionWriteOutcome::Created { version: 1 })
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn outcome_exposes_its_version() {
        assert_eq!(VersionWriteOutcome::Created { version: 3 }.version(), 3);
        assert_eq!(VersionWriteOutcome::Unchanged { version: 2 }.version(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_reports_created() {
        let repo = FixtureVersionRepository;
        let outcome = repo
            .record_version(NewScheduleVersion {
                user_id: UserId::new(1),
                schedule_date: NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
                session_id: Uuid::new_v4(),
                payload: "{}".to_owned(),
                payload_hash: "00".to_owned(),
            })
            .await
            .expect("fixture write succeeds");
        assert_eq!(outcome, VersionWriteOutcome::Created { version: 1 });
    }
}
