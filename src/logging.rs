use crate::config::ensure_private_dir;
use crate::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const ACTIVITY_LOG: &str = "activity.log";
const MAX_ACTIVITY_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_ACTIVITY_BACKUPS: u32 = 5;

/// One line of the activity journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ActivityEntry {
    pub fn new(level: &str, component: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            component: component.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

static LOGGER_INITIALIZED: std::sync::Once = std::sync::Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: LazyLock<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    LazyLock::new(|| Mutex::new(None));

pub fn init_logging(logs_dir: &Path) -> Result<(), AppError> {
    ensure_private_dir(logs_dir)?;
    let logs_dir = logs_dir.to_path_buf();

    LOGGER_INITIALIZED.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Console logging - compact format
        let console_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter.clone());

        let file_appender = tracing_appender::rolling::never(&logs_dir, "submit.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if let Ok(mut guard_mutex) = FILE_APPENDER_GUARD.lock() {
            *guard_mutex = Some(guard);
        }

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter);

        // A subscriber may already be installed by an embedding application
        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
    });

    Ok(())
}

/// Mirror `entry` to tracing and append it to the activity journal
pub fn record_activity(logs_dir: &Path, entry: &ActivityEntry) -> Result<(), AppError> {
    match entry.level.as_str() {
        "ERROR" => error!(component = %entry.component, "{}", entry.message),
        "WARN" => warn!(component = %entry.component, "{}", entry.message),
        "DEBUG" => debug!(component = %entry.component, "{}", entry.message),
        _ => info!(component = %entry.component, "{}", entry.message),
    }

    ensure_private_dir(logs_dir)?;
    let log_file_path = logs_dir.join(ACTIVITY_LOG);

    if should_rotate_log(&log_file_path)? {
        rotate_log_file(&log_file_path)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    let json_line = serde_json::to_string(entry)?;
    writeln!(file, "{}", json_line)?;
    file.flush()?;

    Ok(())
}

/// Journal entries, newest first
pub fn read_activity(logs_dir: &Path, max_lines: Option<usize>) -> Result<Vec<ActivityEntry>, AppError> {
    let log_file_path = logs_dir.join(ACTIVITY_LOG);

    if !log_file_path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&log_file_path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
        match line {
            Ok(line_content) => match serde_json::from_str::<ActivityEntry>(&line_content) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(error = %e, "Skipping unreadable activity line"),
            },
            Err(e) => warn!(error = %e, "Error reading activity log line"),
        }
    }

    entries.reverse();

    if let Some(max) = max_lines {
        entries.truncate(max);
    }

    Ok(entries)
}

fn should_rotate_log(log_file_path: &PathBuf) -> Result<bool, AppError> {
    if !log_file_path.exists() {
        return Ok(false);
    }

    let metadata = std::fs::metadata(log_file_path)?;
    Ok(metadata.len() > MAX_ACTIVITY_LOG_SIZE)
}

fn rotate_log_file(log_file_path: &PathBuf) -> Result<(), AppError> {
    // Shift existing backups (4 -> 5, 3 -> 4, etc.)
    for i in (1..MAX_ACTIVITY_BACKUPS).rev() {
        let current_backup = log_file_path.with_extension(format!("log.{}", i));
        let next_backup = log_file_path.with_extension(format!("log.{}", i + 1));

        if current_backup.exists() {
            std::fs::rename(&current_backup, &next_backup)?;
        }
    }

    if log_file_path.exists() {
        let first_backup = log_file_path.with_extension("log.1");
        std::fs::rename(log_file_path, first_backup)?;
    }

    Ok(())
}
