//! Tracing setup for the voxfile tools.
//!
//! Output always goes to stdout. When a log directory is given, each run also
//! appends to its own timestamped file there and older run logs are pruned.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Run logs kept per directory.
const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "voxfile";

static INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Install the global subscriber, optionally mirroring output into `log_dir`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Later calls are no-ops.
pub fn init(log_dir: Option<&Path>) -> Result<(), LoggingError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let timer = build_timer();
    let (file_layer, guard, log_path) = match log_dir {
        Some(dir) => {
            let (writer, guard, path) = open_run_log(dir)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer.clone())
                .with_writer(writer);
            (Some(layer), Some(guard), Some(path))
        }
        None => (None, None, None),
    };
    let stdout_layer = fmt::layer().with_timer(timer).with_writer(std::io::stdout);

    let subscriber = Registry::default()
        .with(build_env_filter())
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = INITIALIZED.set(guard);

    if let Some(path) = log_path {
        tracing::debug!("Logging to {}", path.display());
    }
    Ok(())
}

fn open_run_log(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard, PathBuf), LoggingError> {
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let name = format_log_file_name(now_local_or_utc())?;
    let path = dir.join(&name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.clone(),
            source,
        })?;
    prune_old_logs(dir, MAX_LOG_FILES)?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, name));
    Ok((writer, guard, path))
}

fn prune_old_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let mut logs = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|entry| entry.path())
        .filter(|path| is_run_log(path))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect::<Vec<_>>();

    logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    for (_, path) in logs.into_iter().skip(keep) {
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

fn is_run_log(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
    has_prefix && path.extension().and_then(|ext| ext.to_str()) == Some("log")
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{stamp}.log"))
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};
    use tempfile::tempdir;

    #[test]
    fn log_filename_has_timestamp_and_prefix() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let name = format_log_file_name(fixed).unwrap();
        assert_eq!(name, "voxfile_2023-11-14_22-13-20.log");
    }

    #[test]
    fn prune_keeps_newest_run_logs_only() {
        let dir = tempdir().unwrap();
        for idx in 0..12 {
            fs::write(dir.path().join(format!("voxfile_{idx:02}.log")), b"").unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        fs::write(dir.path().join("other.log"), b"").unwrap();

        prune_old_logs(dir.path(), 10).unwrap();
        let mut names = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"other.log".to_string()));
        assert!(!names.contains(&"voxfile_00.log".to_string()));
        assert!(!names.contains(&"voxfile_01.log".to_string()));
    }
}
