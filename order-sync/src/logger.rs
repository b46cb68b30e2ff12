//! Logging setup
//!
//! Console output (pretty or JSON) plus an optional daily rotating file
//! under `<log_dir>/app`. Rotated files older than the retention window are
//! removed at startup.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, TimeZone};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Days of rotated application logs to keep
pub const LOG_RETENTION_DAYS: i64 = 14;

const APP_LOG_PREFIX: &str = "app";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console-only logger
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Initialize the global subscriber
///
/// `RUST_LOG` overrides `level` when set. Fails if a subscriber is already
/// installed.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: BoxedLayer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_filter(filter())
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter())
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(dir) = log_dir {
        let app_dir = prepare_log_dir(Path::new(dir))?;
        let removed = cleanup_old_logs(Path::new(dir), LOG_RETENTION_DAYS)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, app_dir, APP_LOG_PREFIX);
        let writer = std::sync::Mutex::new(appender);

        let file: BoxedLayer = if json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_thread_ids(true)
                .with_writer(writer)
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter())
                .boxed()
        };
        layers.push(file);

        tracing_subscriber::registry().with(layers).try_init()?;
        if removed > 0 {
            tracing::info!(removed, log_dir = %dir, "Removed old log files");
        }
    } else {
        tracing_subscriber::registry().with(layers).try_init()?;
    }

    Ok(())
}

/// Create `<log_dir>/app` and return its path
fn prepare_log_dir(log_dir: &Path) -> std::io::Result<PathBuf> {
    let app_dir = log_dir.join(APP_LOG_PREFIX);
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Delete `app.YYYY-MM-DD` files older than `retention_days`
///
/// Returns the number of files removed. Files not matching the rotation
/// pattern are left alone.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> anyhow::Result<usize> {
    let app_dir = log_dir.join(APP_LOG_PREFIX);
    if !app_dir.exists() {
        return Ok(0);
    }

    let cutoff = Local::now() - chrono::Duration::days(retention_days);
    let mut removed = 0;

    for entry in fs::read_dir(&app_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = rotated_date(name) else {
            continue;
        };

        if let Some(midnight) = date.and_hms_opt(0, 0, 0)
            && let Some(local) = Local.from_local_datetime(&midnight).single()
            && local < cutoff
        {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Date suffix of a rotated file name (`app.2024-01-31`)
fn rotated_date(file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(APP_LOG_PREFIX)?
        .strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
