//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod event_store;
mod image_store;
mod notification_repository;
mod ocr_engine;
mod session_repository;
mod version_repository;

#[cfg(test)]
pub use event_store::MockEventStore;
pub use event_store::{
    EventStore, EventStoreError, FixtureEventStore, ObservationOutcome, ObservationRecord,
};
#[cfg(test)]
pub use image_store::MockImageStore;
pub use image_store::{FixtureImageStore, ImageStore, ImageStoreError};
#[cfg(test)]
pub use notification_repository::MockNotificationRepository;
pub use notification_repository::{
    FixtureNotificationRepository, NotificationRepository, NotificationRepositoryError,
};
#[cfg(test)]
pub use ocr_engine::MockOcrEngine;
pub use ocr_engine::{FixtureOcrEngine, OcrEngine, OcrEngineError};
#[cfg(test)]
pub use session_repository::MockSessionRepository;
pub use session_repository::{
    FixtureSessionRepository, SessionRepository, SessionRepositoryError,
};
#[cfg(test)]
pub use version_repository::MockVersionRepository;
pub use version_repository::{
    FixtureVersionRepository, NewScheduleVersion, VersionRepository, VersionRepositoryError,
    VersionWriteOutcome,
};
