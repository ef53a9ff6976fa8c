pub mod api;
pub mod cascade;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod snapshot;
pub mod validation;

use crate::api::LifecycleApi;
use crate::config::{LifecycleConfig, LoggingConfig};
use crate::errors::{AppError, AppResult};
use crate::lifecycle::LifecycleEngine;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Loads configuration, starts logging and opens the store.
pub fn bootstrap(config_path: Option<&Path>) -> AppResult<LifecycleApi> {
    let config = match config_path {
        Some(path) => LifecycleConfig::load(path)?,
        None => LifecycleConfig::default(),
    };
    if let Err(error) = init_tracing(&config.logging) {
        eprintln!("failed to initialise tracing: {}", error);
    }

    let engine = LifecycleEngine::new(config)?;
    tracing::info!(
        database = %engine.database().path().display(),
        policy = ?engine.config().default_package_policy,
        "lifecycle engine ready"
    );
    Ok(LifecycleApi::new(Arc::new(engine)))
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured filter.
/// Without a log directory, output goes to stderr.
pub fn init_tracing(logging: &LoggingConfig) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.filter));

    let Some(log_dir) = logging.directory.as_ref() else {
        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
        let result = if logging.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        return result.map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, &logging.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|error| AppError::Internal(error.to_string()))
}

pub(crate) fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
