use anyhow::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

/// Installs the global subscriber. When `log_directory` is configured a
/// daily-rolling file layer is added; the returned guard must outlive the
/// process' logging.
pub fn init(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match &config.log_directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "datatracker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(Error::msg)?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(Error::msg)?;
            Ok(None)
        }
    }
}
