//! PostgreSQL persistence adapters using Diesel.
//!
//! Concrete implementations of the domain repository ports backed by
//! PostgreSQL via `diesel-async` with `bb8` pooling. Adapters stay thin:
//! they translate between Diesel rows and domain types and map database
//! errors onto port errors; business rules live in the domain. Row structs
//! and schema definitions are internal to this module.

mod diesel_event_store;
pub(crate) mod diesel_helpers;
mod diesel_notification_repository;
mod diesel_session_repository;
mod diesel_version_repository;
mod models;
mod pool;
mod schema;

pub use diesel_event_store::DieselEventStore;
pub use diesel_notification_repository::DieselNotificationRepository;
pub use diesel_session_repository::{DieselSessionRepository, LeaseSettings};
pub use diesel_version_repository::DieselVersionRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
