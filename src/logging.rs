use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Initializes logging with console output and a daily-rotated JSON file
/// under `logs/`. Keep the returned guard alive until exit so buffered file
/// logs are flushed.
pub fn init_logging() -> WorkerGuard {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "igs.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // stdout is reserved for command output
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive(
            "igs_analytics=info"
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        );

    // A second call is a no-op
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
