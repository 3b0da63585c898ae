//! Logging setup shared by the server and the geocoding job.
//!
//! On Linux the systemd journal is used when it is reachable. Otherwise logs
//! go to a daily rolling file when a log directory is configured, and to
//! stderr when it is not.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system. Call once at startup.
///
/// Level comes from `VETERIMAP_LOG` (e.g. `debug`, `veterimap=debug,info`),
/// defaulting to `info`.
pub fn init(log_dir: Option<PathBuf>, file_name: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("VETERIMAP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = tracing_appender::rolling::daily(&log_dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = GUARD.set(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()?;

            tracing::info!("Logging initialized with file backend at {:?}", log_dir);
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
