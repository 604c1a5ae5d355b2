use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Initialize structured logging.
///
/// Console output always goes to stderr so CLI tables on stdout stay clean.
/// When `logging.file_path` is set, a daily-rolling file layer is added; the
/// returned guard must be held until exit or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_override.unwrap_or(&config.level)))
        .map_err(|e| anyhow::anyhow!("Failed to create log filter: {}", e))?;

    let registry = Registry::default().with(env_filter);
    let json_console = config.format == "json";

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!json_console)
        .with_target(true);

    let guard = match config.file_path.as_deref() {
        Some(log_path) => {
            let log_path = Path::new(log_path);
            let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = log_path
                .file_name()
                .map_or_else(|| "lead-tracker.log".into(), |name| name.to_string_lossy().into_owned());
            let (writer, guard) = non_blocking(rolling::daily(directory, file_name));

            fn file_layer<S>(
                writer: NonBlocking,
            ) -> tracing_subscriber::fmt::Layer<
                S,
                tracing_subscriber::fmt::format::JsonFields,
                tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
                NonBlocking,
            > {
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .json()
            }

            if json_console {
                registry.with(console_layer.json()).with(file_layer(writer)).try_init()?;
            } else {
                registry.with(console_layer).with(file_layer(writer)).try_init()?;
            }
            Some(guard)
        },
        None => {
            if json_console {
                registry.with(console_layer.json()).try_init()?;
            } else {
                registry.with(console_layer).try_init()?;
            }
            None
        },
    };

    info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(guard)
}

/// Logs how long a store call or broadcast took
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Stop the timer, log at info and return elapsed milliseconds.
    pub fn finish(self) -> u128 {
        let duration = self.start.elapsed().as_millis();
        info!(operation = self.operation, duration_ms = duration, "Operation completed");
        // Drop would log the same operation again at debug.
        std::mem::forget(self);
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            tracing::debug!(
                operation = self.operation,
                duration_ms = self.start.elapsed().as_millis(),
                "Operation finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_reports_elapsed() {
        let timer = OperationTimer::new("unit");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.finish() >= 2);
    }
}
