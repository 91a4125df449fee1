use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
    sync::Mutex,
};

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppPaths, Settings};
use crate::error::{AppError, Result};

/// Install the global subscriber: compact stderr output plus, when a log
/// directory is configured, a daily rolling file. Keep the returned guard
/// alive until exit so buffered lines are flushed.
pub fn init_tracing(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter))
    };

    let stderr_layer = fmt::layer()
        .without_time()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(paths) = settings.paths() else {
        tracing_subscriber::registry().with(stderr_layer).try_init().map_err(|e| {
            AppError::Message(format!("Failed to install tracing subscriber: {e}"))
        })?;
        return Ok(None);
    };

    paths.ensure_layout()?;
    let appender = tracing_appender::rolling::daily(paths.root(), paths.trace_log_prefix());
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Message(format!("Failed to install tracing subscriber: {e}")))?;
    Ok(Some(guard))
}

/// Append-only record of the operations run, one line each.
#[derive(Debug)]
pub struct OpsLogger {
    file: Mutex<std::fs::File>,
}

impl OpsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn for_paths(paths: &AppPaths) -> Result<Self> {
        Self::new(paths.ops_log_path())
    }

    pub fn log_line(&self, action: &str, detail: impl AsRef<str>) -> Result<()> {
        let ts = Utc::now().to_rfc3339();
        let line = format!("{ts} [{action}] {}\n", detail.as_ref());
        let mut guard = self
            .file
            .lock()
            .map_err(|_| AppError::Message("ops log mutex poisoned".into()))?;
        guard.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_log_appends() {
        let dir = std::env::temp_dir().join(format!("dism-kit-ops-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let paths = AppPaths::new(&dir);
        {
            let logger = OpsLogger::for_paths(&paths).unwrap();
            logger.log_line("check-health", "healthy=true").unwrap();
        }
        let logger = OpsLogger::for_paths(&paths).unwrap();
        logger.log_line("features", "count=3").unwrap();

        let content = fs::read_to_string(paths.ops_log_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" [check-health] healthy=true"));
        assert!(lines[1].ends_with(" [features] count=3"));
        fs::remove_dir_all(dir).unwrap();
    }
}
