use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use time::UtcOffset;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::RewriterConfig;

const LOG_RETENTION_DAYS: u64 = 7;
const SESSION_PREFIX: &str = "session-";

/// Where the DEBUG-level session log goes, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLogging {
    Disabled,
    /// `<cache dir>/sanitree/`
    CacheDir,
    Directory(PathBuf),
}

/// Keeps the non-blocking file writer alive. Dropping it flushes and closes
/// the session log.
pub struct LoggerHandle {
    _guard: WorkerGuard,
    log_path: Option<PathBuf>,
}

impl LoggerHandle {
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

/// Default log directory in the user cache directory
/// - Linux: ~/.cache/sanitree/
/// - macOS: ~/Library/Caches/sanitree/
/// - Windows: %LOCALAPPDATA%\sanitree\
fn cache_log_dir() -> io::Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Unable to determine user cache directory"))?;
    Ok(cache_dir.join("sanitree"))
}

/// Removes session logs older than `retention`. Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, retention: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)?.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        let is_session_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SESSION_PREFIX) && name.ends_with(".log"));
        if !metadata.is_file() || !is_session_log {
            continue;
        }
        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", entry.path(), e),
            }
        }
    }

    Ok(removed)
}

fn session_log_path(log_dir: &Path) -> io::Result<PathBuf> {
    let timestamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .map_err(io::Error::other)?;
    Ok(log_dir.join(format!("{}{}-{}.log", SESSION_PREFIX, timestamp, std::process::id())))
}

fn tolerate_reinit(result: Result<(), tracing_subscriber::util::TryInitError>) -> io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        // A subscriber from an earlier call (or another test) is already installed.
        Err(e) if e.to_string().contains("already been set") || e.to_string().contains("SetLoggerError") => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Installs the global tracing subscriber.
///
/// # Arguments
/// * `no_color` - Disable ANSI colors in stderr output
/// * `log_level` - Filter directive for stderr (otherwise `RUST_LOG`, or "info")
/// * `file_logging` - Whether and where to write a DEBUG-level session log
///
/// Calling this again after a subscriber is installed is not an error; the
/// first subscriber stays in place.
pub fn init_logger(no_color: bool, log_level: Option<&str>, file_logging: FileLogging) -> io::Result<LoggerHandle> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    let stderr_filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(timer.clone())
        .with_ansi(!no_color)
        .with_filter(stderr_filter);

    let log_dir = match file_logging {
        FileLogging::Disabled => None,
        FileLogging::CacheDir => Some(cache_log_dir()?),
        FileLogging::Directory(dir) => Some(dir),
    };

    let Some(log_dir) = log_dir else {
        let (_, guard) = tracing_appender::non_blocking(io::sink());
        tolerate_reinit(tracing_subscriber::registry().with(stderr_layer).try_init())?;
        return Ok(LoggerHandle { _guard: guard, log_path: None });
    };

    fs::create_dir_all(&log_dir)?;
    cleanup_old_logs(&log_dir, Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60))?;

    let log_path = session_log_path(&log_dir)?;
    let file = fs::OpenOptions::new().create(true).append(true).open(&log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(timer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug"));

    tolerate_reinit(tracing_subscriber::registry().with(stderr_layer).with(file_layer).try_init())?;
    eprintln!("Logging to file: {:?}", log_path);
    Ok(LoggerHandle { _guard: guard, log_path: Some(log_path) })
}

/// [`init_logger`] using the log level from the configuration.
pub fn init_from_config(config: &RewriterConfig, file_logging: FileLogging) -> io::Result<LoggerHandle> {
    init_logger(false, config.log_level.as_deref(), file_logging)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_only_touches_session_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("session-old.log"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        // Nothing is older than an hour yet.
        assert_eq!(cleanup_old_logs(dir.path(), Duration::from_secs(3600)).unwrap(), 0);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cleanup_old_logs(dir.path(), Duration::from_millis(1)).unwrap(), 1);
        assert!(!dir.path().join("session-old.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_reinit_is_tolerated() {
        let first = init_logger(true, Some("warn"), FileLogging::Disabled);
        assert!(first.is_ok());
        let second = init_logger(true, Some("debug"), FileLogging::Disabled).unwrap();
        assert!(second.log_path().is_none());
    }
}
