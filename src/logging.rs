use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging with a console layer on stderr and a daily JSON log file.
///
/// Stdout is left for the per-stage summary lines. The returned guard must be
/// held until exit so buffered file logs are flushed.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    // Respect RUST_LOG if set; otherwise info for this crate only
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("off_extract=info"));

    // Without a usable log directory, fall back to console-only logging
    if fs::create_dir_all(log_dir).is_err() {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "off_extract.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_directory_is_created() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let guard = init_logging(&log_dir);

        assert!(guard.is_some());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_unusable_log_directory_falls_back_to_console() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();

        let guard = init_logging(&blocker.join("logs"));

        assert!(guard.is_none());
    }
}
