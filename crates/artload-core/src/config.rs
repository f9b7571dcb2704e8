use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::request::Priority;

/// Concurrency and queue bounds for the load scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of loads fetching at once.
    pub max_concurrent: usize,
    /// Maximum number of requests waiting in the pending queue.
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            queue_capacity: 100,
        }
    }
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of retryable failures after which a request is abandoned.
    pub max_retries: u32,
    /// Base delay in seconds; the n-th retry waits `n * base_delay_secs`.
    pub base_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs.max(0.0))
    }
}

/// Memory-pressure admission parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Fraction of total memory above which the process is under pressure.
    pub memory_high_water: f64,
    /// Lowest priority still admitted while under memory pressure.
    pub priority_cutoff: Priority,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            memory_high_water: 0.8,
            priority_cutoff: Priority::High,
        }
    }
}

/// Process lifecycle reactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Resident bytes above which a memory warning sheds non-essential work.
    pub memory_warning_bytes: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            memory_warning_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Where the failure ledger keeps its state between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Json,
    Sqlite,
}

/// Failure ledger suppression rule and storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Failures needed (together with the window) before an identity is suppressed.
    pub suppress_after_failures: u32,
    /// Days that must pass since the first failure before suppression is allowed.
    pub observation_window_days: u64,
    pub backend: LedgerBackend,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            suppress_after_failures: 14,
            observation_window_days: 7,
            backend: LedgerBackend::Json,
        }
    }
}

/// Timeouts for the default curl fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/artload/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtloadConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub admission: AdmissionConfig,
    pub lifecycle: LifecycleConfig,
    pub ledger: LedgerConfig,
    pub fetch: FetchConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("artload")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ArtloadConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ArtloadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ArtloadConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
