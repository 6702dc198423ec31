//! Durable, idempotent worker turning schedule screenshots into versioned
//! canonical days, semantic change events, and outbound notifications.

pub mod config;
pub mod domain;
pub mod outbound;
pub mod runner;
