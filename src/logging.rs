//! # Structured Logging Module
//!
//! Environment-aware structured logging: a console layer always, and a JSON
//! file layer when a log directory is configured.

use crate::config::LoggingConfig;
use crate::constants::env;
use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging. Later calls are no-ops, and an already
/// installed global subscriber is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let directive = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());
        let filter = || {
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&directive))
                .unwrap_or_else(|_| EnvFilter::new("info"))
        };

        let plain_console = (!config.json_console).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter())
        });
        let json_console = config.json_console.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_filter(filter())
        });

        let mut log_file = None;
        let file_layer = config.log_dir.as_ref().and_then(|dir| {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("failed to create log directory {}: {e}", dir.display());
                return None;
            }
            let file_name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            log_file = Some(dir.join(&file_name));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter()),
            )
        });

        let installed = tracing_subscriber::registry()
            .with(plain_console)
            .with(json_console)
            .with(file_layer)
            .try_init();

        if installed.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_file.as_ref().map(|p| p.display().to_string()),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// `MCP_CONFIG_ENV`, then `APP_ENV`, then `development`
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT)
        .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "debug",
        _ => "debug",
    }
}

/// Log a provider lifecycle operation
pub fn log_provider_operation(operation: &str, source: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        source = %source,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔌 PROVIDER_OPERATION"
    );
}
