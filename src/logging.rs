use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Setup logging for a run.
///
/// Events always go to stderr so they never mix with queue output on stdout.
/// When `log_dir` is given, events are additionally written to a daily
/// rotating file in that directory; the returned guard must be held for the
/// duration of the program to keep the file writer flushing.
///
/// `quiet` suppresses everything below warnings on stderr but does not
/// affect the file layer. `RUST_LOG` overrides the level when set.
pub fn setup_logging(
    log_dir: Option<&Utf8Path>,
    quiet: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if quiet { "warn" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match log_dir {
        Some(dir) => {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory: {dir}"))?;
            }
            let file_appender = rolling::daily(dir, "fetchq");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::from_path_buf(temp_dir.path().join("logs")).unwrap();

        // Only exercise directory creation; installing the global subscriber
        // conflicts with other tests in the same process.
        fs::create_dir_all(&log_dir).unwrap();
        assert!(log_dir.exists());
    }
}
