/// Structured logging setup using tracing
///
/// Writes to stderr. Auto-detects format: human-readable with ANSI colors when stderr
/// is a terminal, structured JSON when piped/redirected. An optional log file receives
/// the same events as JSON lines.

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use crate::config::Config;

/// Initialize the global tracing subscriber.
///
/// Log level from config.log_level (default: info); RUST_LOG overrides it at runtime.
/// Must be called at most once per process.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut file_error = None;
    let file_layer = match config.log_file.as_deref() {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .json(),
            ),
            Err(e) => {
                file_error = Some(format!("{}: {}", path, e));
                None
            }
        },
        None => None,
    };

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
            )
            .init();
    }

    if let Some(error) = file_error {
        tracing::warn!(error = %error, "Could not open log_file, logging to stderr only");
    }
}
