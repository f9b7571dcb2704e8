//! Logging init: file under XDG state dir, or graceful fallback to stderr.
//!
//! Both variants honour `RUST_LOG`; the default keeps scheduler transitions at
//! debug level so queue behaviour can be reconstructed from the log.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,artload_core=debug,artload=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Appending log file handle; each writer is a clone of the same descriptor,
/// falling back to stderr if the clone fails.
struct LogFile(fs::File);

enum LogSink {
    File(fs::File),
    Stderr,
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => io::Write::write(f, buf),
            LogSink::Stderr => io::Write::write(&mut io::stderr().lock(), buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => io::Write::flush(f),
            LogSink::Stderr => io::Write::flush(&mut io::stderr().lock()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(LogSink::File)
            .unwrap_or(LogSink::Stderr)
    }
}

/// Default log directory: `~/.local/state/artload`.
pub fn default_log_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("artload")?;
    Ok(xdg_dirs.get_state_home())
}

/// Initialize structured logging to `~/.local/state/artload/artload.log`.
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    init_logging_in(&default_log_dir()?)
}

/// Initialize structured logging to `artload.log` inside `log_dir`.
pub fn init_logging_in(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).with_context(|| format!("create log dir: {}", log_dir.display()))?;
    let log_file_path = log_dir.join("artload.log");

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
        .with_context(|| format!("open log file: {}", log_file_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(BoxMakeWriter::new(LogFile(file)))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;

    tracing::info!("artload logging initialized at {}", log_file_path.display());
    Ok(())
}

/// Initialize logging to stderr only (no file). Use when init_logging() fails so the CLI keeps running.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_creates_log_in_given_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested");
        init_logging_in(&log_dir).unwrap();
        tracing::info!("hello from test");
        assert!(log_dir.join("artload.log").exists());
        // A second global subscriber is refused, not a panic.
        assert!(init_logging_in(&log_dir).is_err());
    }

    #[test]
    fn default_log_dir_has_single_app_component() {
        let dir = default_log_dir().unwrap();
        assert_eq!(dir.file_name().unwrap(), "artload");
        assert_ne!(dir.parent().unwrap().file_name().unwrap(), "artload");
    }
}
