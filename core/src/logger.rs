//! Structured logging, grounded in the same `tracing` + `tracing-appender`
//! shape production Rust services use: an `EnvFilter` level, a format
//! choice, and an optional rotating file target.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Development,
    Production,
}

impl std::str::FromStr for LogMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(LogMode::Development),
            "production" | "prod" => Ok(LogMode::Production),
            other => Err(format!("unknown log mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRotation {
    Daily,
    Hourly,
    Never,
}

impl std::str::FromStr for FileRotation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(FileRotation::Daily),
            "hourly" => Ok(FileRotation::Hourly),
            "never" => Ok(FileRotation::Never),
            other => Err(format!("unknown log rotation: {}", other)),
        }
    }
}

impl FileRotation {
    fn to_tracing(self) -> tracing_appender::rolling::Rotation {
        match self {
            FileRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            FileRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            FileRotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub mode: LogMode,
    pub dir: Option<PathBuf>,
    pub rotation: FileRotation,
    pub retention: usize,
    pub compression: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            mode: LogMode::Development,
            dir: None,
            rotation: FileRotation::Daily,
            retention: 7,
            compression: false,
        }
    }
}

impl LogConfig {
    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Result of `init`: the caller must keep the returned guard alive for
/// the process lifetime or buffered file log lines will be dropped.
pub struct LoggerGuard(#[allow(dead_code)] Option<WorkerGuard>);

/// Initialise the global `tracing` subscriber from `config`. Idempotent:
/// a second call is a silent no-op rather than a panic, matching the
/// process-wide lazy-init pattern used elsewhere (the skill cache).
pub fn init(config: &LogConfig) -> LoggerGuard {
    let filter = config.build_filter();

    match (config.mode, &config.dir) {
        (LogMode::Production, Some(dir)) => {
            let appender = tracing_appender::rolling::RollingFileAppender::new(
                config.rotation.to_tracing(),
                dir,
                "dexter.log",
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(non_blocking).with_ansi(false))
                .try_init();
            prune_old_logs(dir, config.retention);
            LoggerGuard(Some(guard))
        }
        _ => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_ansi(true))
                .try_init();
            LoggerGuard(None)
        }
    }
}

/// Best-effort retention enforcement: keep only the `retention` newest
/// `dexter.log.*` files in `dir`. Errors are swallowed, since pruning is
/// housekeeping, not a correctness requirement.
fn prune_old_logs(dir: &std::path::Path, retention: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with("dexter.log"))
                .unwrap_or(false)
        })
        .collect();
    files.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    if files.len() > retention {
        for entry in &files[..files.len() - retention] {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_mode() {
        assert_eq!("development".parse::<LogMode>().unwrap(), LogMode::Development);
        assert_eq!("production".parse::<LogMode>().unwrap(), LogMode::Production);
        assert!("sideways".parse::<LogMode>().is_err());
    }

    #[test]
    fn parses_rotation() {
        assert_eq!("daily".parse::<FileRotation>().unwrap(), FileRotation::Daily);
        assert!("fortnightly".parse::<FileRotation>().is_err());
    }

    #[test]
    fn default_config_is_development_to_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.mode, LogMode::Development);
        assert!(config.dir.is_none());
    }
}
