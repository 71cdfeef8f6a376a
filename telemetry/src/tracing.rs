use catalog_config::environment::Environment;
use std::sync::Once;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Directory in which production log files are written.
const LOGS_DIR: &str = "logs";

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Environment variable enabling log output in tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine the runtime environment: {0}")]
    Environment(#[from] std::io::Error),

    #[error("failed to install the log compatibility layer: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the background log writer alive. Dropping it flushes pending log lines.
#[must_use = "dropping the flusher stops the background log writer"]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global subscriber for a binary named `app_name`.
///
/// In `dev` logs are pretty-printed to stdout. In `prod` they are written as JSON lines to a
/// daily rolling file under `logs/` through a non-blocking writer. The filter comes from
/// `RUST_LOG` and defaults to `info`. Records emitted through the `log` crate are forwarded.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    init_tracing_for_environment(app_name, environment)
}

/// Same as [`init_tracing`] with an explicit environment.
pub fn init_tracing_for_environment(
    app_name: &str,
    environment: Environment,
) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if environment.is_prod() {
        let file_appender = tracing_appender::rolling::daily(LOGS_DIR, format!("{app_name}.log"));
        let (writer, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer),
            )
            .try_init()?;

        return Ok(LogFlusher {
            _guard: Some(guard),
        });
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    Ok(LogFlusher { _guard: None })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var_os(ENABLE_TEST_TRACING_ENV_NAME).is_none() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
