//! Worker entry-point: wires configuration, the database pool, and the
//! outbound adapters into the poll loop.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use mockable::DefaultClock;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use schedule_ingest::config::{WorkerConfig, SERVICE_NAME};
use schedule_ingest::domain::processor::{
    SessionProcessor, SessionProcessorConfig, SessionProcessorPorts,
};
use schedule_ingest::outbound::object_store::FilesystemImageStore;
use schedule_ingest::outbound::ocr::PrerenderedOcrEngine;
use schedule_ingest::outbound::persistence::{
    DbPool, DieselEventStore, DieselNotificationRepository, DieselSessionRepository,
    DieselVersionRepository, LeaseSettings, PoolConfig,
};
use schedule_ingest::runner::Runner;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(
                service = SERVICE_NAME,
                event = "worker.config_error",
                error.message = %e,
                "configuration error"
            );
            return ExitCode::FAILURE;
        }
    };

    let pool = match DbPool::new(PoolConfig::new(&config.database_url, &config.db_schema)).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(
                service = SERVICE_NAME,
                event = "worker.pool_error",
                error.message = %e,
                "failed to build database pool"
            );
            return ExitCode::FAILURE;
        }
    };

    let sessions = match DieselSessionRepository::new(
        pool.clone(),
        LeaseSettings {
            worker_id: config.worker_id.clone(),
            lease_timeout: config.lease_timeout,
            idle_timeout: config.session_idle_timeout,
            states: config.states.clone(),
        },
    ) {
        Ok(sessions) => sessions,
        Err(e) => {
            error!(
                service = SERVICE_NAME,
                event = "worker.config_error",
                error.message = %e,
                "invalid session state configuration"
            );
            return ExitCode::FAILURE;
        }
    };

    let image_root =
        env::var("IMAGE_STORE_ROOT").unwrap_or_else(|_| "./captures".to_owned());
    let ports = SessionProcessorPorts {
        sessions: Arc::new(sessions),
        versions: Arc::new(DieselVersionRepository::new(pool.clone())),
        events: Arc::new(DieselEventStore::new(pool.clone())),
        notifications: Arc::new(DieselNotificationRepository::new(pool)),
        images: Arc::new(FilesystemImageStore::new(image_root)),
        ocr: Arc::new(PrerenderedOcrEngine),
    };

    let processor = Arc::new(SessionProcessor::new(
        ports,
        Arc::new(DefaultClock),
        SessionProcessorConfig {
            heartbeat_interval: config.lease_heartbeat,
            summary_threshold: config.summary_threshold,
            time_tolerance_minutes: config.time_tolerance_minutes,
            default_schedule_year: config.default_schedule_year,
        },
    ));

    info!(
        service = SERVICE_NAME,
        event = "worker.started",
        worker_id = %config.worker_id,
        db_schema = %config.db_schema,
        poll_seconds = config.poll_interval.as_secs(),
        idle_timeout_seconds = config.session_idle_timeout.as_secs(),
        lease_timeout_seconds = config.lease_timeout.as_secs(),
        "worker loop starting"
    );

    Runner::new(processor, config.poll_interval, config.idle_log_every)
        .run_until_shutdown()
        .await;
    ExitCode::SUCCESS
}
