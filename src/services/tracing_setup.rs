//! Tracing subscriber setup
//!
//! The terminal is owned by the device, so logs go to a file instead of
//! stdout/stderr.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber writing to `log_file_path`.
///
/// Filtering comes from RUST_LOG, with DEBUG as the default level.
pub fn init_global(log_file_path: &Path) -> anyhow::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file).try_init()?;
    Ok(())
}

/// Build a subscriber with file logging.
///
/// This is the subscriber configuration shared between hosts and tests.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into());
    build_subscriber_with_filter(log_file, env_filter)
}

fn build_subscriber_with_filter(
    log_file: File,
    env_filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_debug_messages_reach_log_file() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("Terminal device started");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("DEBUG"), "Log should contain DEBUG level");
        assert!(contents.contains("Terminal device started"));
    }

    #[test]
    fn test_trace_messages_filtered_at_debug_level() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber =
            build_subscriber_with_filter(log_file.reopen().unwrap(), EnvFilter::new("debug"));

        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!("Window resize (1 notifications)");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap_or_default();
        assert!(!contents.contains("Window resize"));
    }
}
