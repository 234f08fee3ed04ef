use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Daemon configuration, loaded from a TOML file. Every field has a
/// default so a missing or partial file still yields a runnable daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_alert_db_path")]
    pub alert_db_path: String,
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_true")]
    pub enable_apt_monitor: bool,
    #[serde(default)]
    pub enable_cve_scan: bool,
    #[serde(default = "default_disk_warn")]
    pub disk_warn_threshold: f64,
    #[serde(default = "default_disk_crit")]
    pub disk_crit_threshold: f64,
    #[serde(default = "default_mem_warn")]
    pub mem_warn_threshold: f64,
    #[serde(default = "default_mem_crit")]
    pub mem_crit_threshold: f64,
    #[serde(default = "default_max_requests")]
    pub max_requests_per_sec: u32,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_retention")]
    pub alert_retention_hours: u64,
    /// Model loaded at startup when set; models can also be loaded later
    /// over RPC.
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_llm_context")]
    pub llm_context_length: usize,
    #[serde(default = "default_llm_threads")]
    pub llm_threads: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_path() -> String {
    "/run/cortex/cortexd.sock".to_string()
}

fn default_alert_db_path() -> String {
    "/var/lib/cortex/alerts.db".to_string()
}

fn default_monitor_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_disk_warn() -> f64 {
    0.85
}

fn default_disk_crit() -> f64 {
    0.95
}

fn default_mem_warn() -> f64 {
    0.90
}

fn default_mem_crit() -> f64 {
    0.95
}

fn default_max_requests() -> u32 {
    60
}

fn default_dedup_window() -> u64 {
    300
}

fn default_retention() -> u64 {
    168
}

fn default_llm_context() -> usize {
    2048
}

fn default_llm_threads() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config deserializes via field defaults")
    }
}

impl DaemonConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid daemon configuration")
    }

    /// The typed snapshot returned by `config.get`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "socket_path": self.socket_path,
            "alert_db_path": self.alert_db_path,
            "model_path": self.model_path,
            "llm_context_length": self.llm_context_length,
            "llm_threads": self.llm_threads,
            "monitor_interval_sec": self.monitor_interval_secs,
            "log_level": self.log_level,
            "thresholds": {
                "disk_warn": self.disk_warn_threshold,
                "disk_crit": self.disk_crit_threshold,
                "mem_warn": self.mem_warn_threshold,
                "mem_crit": self.mem_crit_threshold,
            },
        })
    }
}

/// Shared, reloadable view of the configuration.
///
/// `reload` re-reads the original file and swaps the snapshot atomically;
/// readers holding an older `Arc` keep a consistent view.
#[derive(Clone)]
pub struct ConfigHandle {
    path: Arc<PathBuf>,
    current: Arc<RwLock<Arc<DaemonConfig>>>,
}

impl ConfigHandle {
    /// Load from `path`. A missing file yields the defaults; a present but
    /// invalid file is a startup error.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            current: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    pub fn get(&self) -> Arc<DaemonConfig> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read the config file; on success the new snapshot replaces the
    /// old one, on failure the old snapshot stays in effect.
    pub fn reload(&self) -> Result<()> {
        let config = Self::read(&self.path)?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(config);
        tracing::info!(path = %self.path.display(), "Configuration reloaded");
        Ok(())
    }

    fn read(path: &Path) -> Result<DaemonConfig> {
        if !path.exists() {
            return Ok(DaemonConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        DaemonConfig::parse(&content)
    }
}
