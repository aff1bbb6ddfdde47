pub mod models;
pub mod services;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_PREFIX: &str = "omnidetect_";
const LOGS_KEPT: usize = 30;

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging: stderr console plus a per-session log file.
///
/// `OMNIDETECT_DISABLE_FILE_LOG=1` keeps logging console-only and
/// `OMNIDETECT_LOG_DIR` overrides the log directory. Stdout is left to
/// command output.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env_flag("OMNIDETECT_DISABLE_FILE_LOG") {
        init_console_only_logging(env_filter);
        return;
    }

    let logs_dir = match std::env::var("OMNIDETECT_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_PREFIX, timestamp);

    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    info!("Log file: {}", logs_dir.join(&log_filename).display());
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    std::thread::spawn(move || cleanup_old_logs(&logs_dir, LOGS_KEPT));
}

fn get_logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("omnidetect").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_old_logs_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("{}2026010{}_000000.log", LOG_PREFIX, i)), "x").unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), "x").unwrap();

        cleanup_old_logs(dir.path(), 3);

        let logs = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_PREFIX))
            .count();
        assert_eq!(logs, 3);
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
