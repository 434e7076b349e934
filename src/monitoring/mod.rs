use crate::error::{PortfolioError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Initializes tracing with a console layer and a daily-rolling JSON file layer.
///
/// The returned guard must be kept alive for the lifetime of the process so the
/// non-blocking file writer flushes on shutdown.
pub fn init_logging(log_dir: &str, file_level: &str, console_level: &str) -> Result<WorkerGuard> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        std::fs::create_dir_all(log_path).map_err(PortfolioError::Io)?;
    }

    let file_appender = rolling::daily(log_dir, "solfolio.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_new(file_level).map_err(|e| {
        PortfolioError::InvalidConfig(format!("Invalid file log filter '{}': {}", file_level, e))
    })?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .with_filter(file_filter);

    let console_filter = EnvFilter::try_new(console_level).map_err(|e| {
        PortfolioError::InvalidConfig(format!(
            "Invalid console log filter '{}': {}",
            console_level, e
        ))
    })?;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            PortfolioError::Internal(format!("Failed to initialize tracing subscriber: {}", e))
        })?;

    Ok(guard)
}
