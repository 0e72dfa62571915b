//! Console and rotating file logging.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationPeriod {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl std::str::FromStr for RotationPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" | "hour" => Ok(RotationPeriod::Hourly),
            "daily" | "day" => Ok(RotationPeriod::Daily),
            "never" | "none" => Ok(RotationPeriod::Never),
            _ => Err(format!(
                "Invalid rotation period '{s}', expected one of: hourly, daily, never"
            )),
        }
    }
}

impl From<RotationPeriod> for Rotation {
    fn from(period: RotationPeriod) -> Self {
        match period {
            RotationPeriod::Hourly => Rotation::HOURLY,
            RotationPeriod::Daily => Rotation::DAILY,
            RotationPeriod::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_prefix: String,
    pub rotation: RotationPeriod,
    /// Number of log files kept on disk, 0 keeps all of them.
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            log_prefix: "mqtt-switch".to_string(),
            rotation: RotationPeriod::Daily,
            max_log_files: 7,
        }
    }
}

/// Keeps the background log writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Logs to stdout, and additionally to rotating files when `file` is set.
///
/// Filtering follows `RUST_LOG`.
pub fn setup_logging(file: Option<LogConfig>) -> std::io::Result<LogGuard> {
    let console_layer = Layer::default().with_writer(std::io::stdout).with_target(true);

    let Some(config) = file else {
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(console_layer)
            .init();
        return Ok(LogGuard { _guard: None });
    };

    if config.max_log_files > 0 {
        cleanup_old_logs(&config.log_dir, &config.log_prefix, config.max_log_files)?;
    }
    let mut appender = RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(&config.log_prefix)
        .filename_suffix("log");
    if config.max_log_files > 0 {
        appender = appender.max_log_files(config.max_log_files);
    }
    let appender = appender
        .build(&config.log_dir)
        .map_err(std::io::Error::other)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = Layer::default()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LogGuard {
        _guard: Some(guard),
    })
}

/// Deletes the oldest `<prefix>*.log` files so that at most `keep` remain.
fn cleanup_old_logs(log_dir: &Path, prefix: &str, keep: usize) -> std::io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let mut log_files: Vec<_> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix) && name.ends_with(".log"))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in log_files.into_iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(&path) {
            eprintln!("Warning: failed to remove old log file {path:?}: {e}");
        }
    }
    Ok(())
}
