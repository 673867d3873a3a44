use crate::error::{AppError, ErrorContext};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured backend address
pub const BACKEND_URL_ENV: &str = "SWINGCHECK_BACKEND_URL";

/// Maximum accepted video size (400 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 400 * 1024 * 1024;

pub const DEFAULT_BACKEND_PORT: u16 = 5050;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Bound on a single control-plane request (authorize, notify, one status query)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

// 60 polls at 10s is roughly ten minutes of wall clock
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// How a video reaches the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    /// authorize → transfer to storage → notify → poll
    #[default]
    Presigned,
    /// One multipart POST to `/upload` returning the analysis synchronously
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitConfig {
    pub backend_url: Option<String>,
    pub page_origin: Option<String>,
    pub lan_guesses: Vec<String>,
    pub loopback_fallbacks: Vec<String>,
    pub backend_port: u16,
    pub mode: SubmissionMode,
    pub probe_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_ms: u64,
    pub max_file_size_bytes: u64,
    /// Where outcomes are stored; the resolved backend when unset
    pub persistence_url: Option<String>,
    /// `false` discards outcomes and feedback instead of storing them
    pub persist_outcomes: bool,
    /// Route requests through `HTTP_PROXY`/`HTTPS_PROXY`; off since backends are on the LAN
    pub use_system_proxy: bool,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            page_origin: None,
            lan_guesses: default_lan_guesses(),
            loopback_fallbacks: vec![
                "http://localhost:5050".to_string(),
                "http://127.0.0.1:5050".to_string(),
            ],
            backend_port: DEFAULT_BACKEND_PORT,
            mode: SubmissionMode::Presigned,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            persistence_url: None,
            persist_outcomes: true,
            use_system_proxy: false,
        }
    }
}

fn default_lan_guesses() -> Vec<String> {
    [
        "http://192.168.1.118:5050",
        "http://192.168.1.1:5050",
        "http://192.168.0.1:5050",
        "http://10.0.0.1:5050",
        "http://172.20.10.2:5050",  // iPhone hotspot client
        "http://192.168.43.2:5050", // Android hotspot client
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Liveness check settings
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }
}

/// Job status polling settings
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// A status query still pending after this counts as a failed attempt
    pub request_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl SubmitConfig {
    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            request_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Apply `SWINGCHECK_BACKEND_URL` on top of the file value
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.backend_url = Some(url.to_string());
            }
        }
        self
    }
}

pub fn get_config_dir() -> Result<PathBuf, AppError> {
    if let Some(home_dir) = dirs::home_dir() {
        Ok(home_dir.join(".swingcheck"))
    } else {
        Err(AppError::Config("Could not find home directory".to_string()))
    }
}

pub fn get_config_file_path() -> Result<PathBuf, AppError> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, AppError> {
    Ok(get_config_dir()?.join("logs"))
}

/// Create `dir` with owner-only permissions if it is missing
pub fn ensure_private_dir(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        fs::create_dir_all(dir).context("Failed to create directory")?;

        // 700 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

pub fn ensure_logs_dir() -> Result<PathBuf, AppError> {
    let logs_dir = get_logs_dir()?;
    ensure_private_dir(&logs_dir)?;
    Ok(logs_dir)
}

pub fn load_config() -> Result<SubmitConfig, AppError> {
    let config_dir = get_config_dir()?;
    ensure_private_dir(&config_dir)?;
    Ok(load_config_from(&get_config_file_path()?)?.with_env_overrides())
}

pub fn load_config_from(config_file: &Path) -> Result<SubmitConfig, AppError> {
    if config_file.exists() {
        let content = fs::read_to_string(config_file).context("Failed to read config file")?;
        let config: SubmitConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    } else {
        Ok(SubmitConfig::default())
    }
}

pub fn save_config(config: &SubmitConfig) -> Result<(), AppError> {
    let config_dir = get_config_dir()?;
    ensure_private_dir(&config_dir)?;
    save_config_to(&get_config_file_path()?, config)
}

pub fn save_config_to(config_file: &Path, config: &SubmitConfig) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(config)?;

    fs::write(config_file, content)?;

    // 600 on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(config_file)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(config_file, permissions)?;
    }

    Ok(())
}
