//! The periodic system-health observation loop.
//!
//! [`SystemMonitor`] drives the collectors on a fixed interval, maintains
//! the shared [`HealthSnapshot`], raises threshold alerts through the
//! alert manager, and (when an inference engine is attached and loaded)
//! spawns detached enrichment tasks that annotate raised alerts with an
//! AI analysis. Shutdown is cooperative: the worker polls its running
//! flag on one-second sleep boundaries.

mod enrichment;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use cortexd_alert::AlertManager;
use cortexd_collector::apt::AptCollector;
use cortexd_collector::cpu::CpuCollector;
use cortexd_collector::cve::CveCollector;
use cortexd_collector::disk::DiskCollector;
use cortexd_collector::memory::MemoryCollector;
use cortexd_common::types::{AlertType, CveSeverity, HealthSnapshot, Severity};
use cortexd_common::Service;
use cortexd_llm::LlmEngine;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// The apt query spawns a subprocess, so it only runs once per this many
/// monitor cycles; other cycles reuse the cached counts.
const APT_CHECK_EVERY: u64 = 5;

/// Monitor tuning knobs. Thresholds are fractions of capacity (0.95 means
/// alert at 95% usage).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval_secs: u64,
    pub enable_apt_monitor: bool,
    pub enable_cve_scan: bool,
    pub disk_warn_threshold: f64,
    pub disk_crit_threshold: f64,
    pub mem_warn_threshold: f64,
    pub mem_crit_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            enable_apt_monitor: true,
            enable_cve_scan: false,
            disk_warn_threshold: 0.85,
            disk_crit_threshold: 0.95,
            mem_warn_threshold: 0.90,
            mem_crit_threshold: 0.95,
        }
    }
}

/// System monitoring service. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SystemMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    alerts: Arc<AlertManager>,
    engine: Option<Arc<dyn LlmEngine>>,

    cpu: CpuCollector,
    memory: MemoryCollector,
    disk: DiskCollector,
    apt: AptCollector,
    cve: CveCollector,

    snapshot: Mutex<HealthSnapshot>,
    running: AtomicBool,
    check_requested: AtomicBool,
    apt_counter: AtomicU64,

    // LLM state mirrored into the snapshot; updated by the IPC handlers.
    llm_loaded: AtomicBool,
    llm_queue_size: AtomicU64,
    llm_model_name: Mutex<String>,

    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SystemMonitor {
    pub fn new(
        config: MonitorConfig,
        alerts: Arc<AlertManager>,
        engine: Option<Arc<dyn LlmEngine>>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                alerts,
                engine,
                cpu: CpuCollector::new(),
                memory: MemoryCollector::new(),
                disk: DiskCollector::new(),
                apt: AptCollector::new(),
                cve: CveCollector::new(),
                snapshot: Mutex::new(HealthSnapshot::default()),
                running: AtomicBool::new(false),
                check_requested: AtomicBool::new(false),
                apt_counter: AtomicU64::new(0),
                llm_loaded: AtomicBool::new(false),
                llm_queue_size: AtomicU64::new(0),
                llm_model_name: Mutex::new(String::new()),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Copy of the current snapshot.
    pub fn get_snapshot(&self) -> HealthSnapshot {
        self.inner.lock(&self.inner.snapshot).clone()
    }

    /// Ask the worker to run a check on its next wakeup.
    pub fn trigger_check(&self) {
        self.inner.check_requested.store(true, Ordering::SeqCst);
    }

    /// Run a full check synchronously on the caller and return the fresh
    /// snapshot.
    pub fn force_check(&self) -> HealthSnapshot {
        tracing::debug!("Running forced health check");
        self.inner.run_checks();
        self.get_snapshot()
    }

    /// Mirror the engine's load state into the snapshot.
    pub fn set_llm_state(&self, loaded: bool, model_name: &str, queue_size: u64) {
        self.inner.llm_loaded.store(loaded, Ordering::SeqCst);
        self.inner.llm_queue_size.store(queue_size, Ordering::SeqCst);
        *self.inner.lock(&self.inner.llm_model_name) = model_name.to_string();
    }
}

#[async_trait]
impl Service for SystemMonitor {
    fn name(&self) -> &str {
        "SystemMonitor"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.monitor_loop().await });
        *self.inner.lock(&self.inner.worker) = Some(handle);

        tracing::info!(
            interval_secs = self.inner.config.check_interval_secs,
            "System monitor started"
        );
        Ok(())
    }

    async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = self.inner.lock(&self.inner.worker).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("System monitor stopped");
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn is_healthy(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl MonitorInner {
    async fn monitor_loop(self: Arc<Self>) {
        tracing::debug!("Monitor loop started");

        // First check runs immediately, before any sleeping.
        self.run_checks();
        let mut last_check = Instant::now();
        let interval = Duration::from_secs(self.config.check_interval_secs);

        while self.running.load(Ordering::SeqCst) {
            // Sleep in one-second increments for prompt shutdown response.
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if last_check.elapsed() >= interval || self.check_requested.load(Ordering::SeqCst) {
                self.check_requested.store(false, Ordering::SeqCst);
                self.run_checks();
                last_check = Instant::now();
            }
        }

        tracing::debug!("Monitor loop ended");
    }

    /// One full observation cycle. A failing collector degrades to zeroed
    /// stats; it never aborts the cycle.
    fn run_checks(&self) {
        let cpu_usage = self.cpu.usage_percent();
        let mem_stats = self.memory.stats();
        let disk_stats = self.disk.root_stats();

        // The slow subprocess collectors run on a subsampled cadence.
        let cycle = self.apt_counter.fetch_add(1, Ordering::SeqCst);
        let slow_cycle = cycle % APT_CHECK_EVERY == 0;

        let (pending, security) = if self.config.enable_apt_monitor {
            if slow_cycle {
                self.apt.check_updates();
            }
            (self.apt.pending_count(), self.apt.security_count())
        } else {
            (0, 0)
        };

        if self.config.enable_cve_scan && slow_cycle {
            self.cve.scan();
            self.check_cve_exposure();
        }

        // Alert counts are SQLite reads; take them before the snapshot lock.
        let active_alerts = self.alerts.count_active();
        let critical_alerts = self.alerts.count_by_severity(Severity::Critical);

        let snapshot = {
            let mut snap = self.lock(&self.snapshot);
            snap.timestamp = Some(Utc::now());
            snap.cpu_usage_percent = cpu_usage;
            snap.memory_usage_percent = mem_stats.usage_percent();
            snap.memory_used_mb = mem_stats.used_mb();
            snap.memory_total_mb = mem_stats.total_mb();
            snap.disk_usage_percent = disk_stats.usage_percent();
            snap.disk_used_gb = disk_stats.used_gb();
            snap.disk_total_gb = disk_stats.total_gb();
            snap.pending_updates = pending;
            snap.security_updates = security;
            snap.active_alerts = active_alerts;
            snap.critical_alerts = critical_alerts;
            snap.llm_loaded = self.llm_loaded.load(Ordering::SeqCst);
            snap.inference_queue_size = self.llm_queue_size.load(Ordering::SeqCst);
            snap.llm_model_name = self.lock(&self.llm_model_name).clone();
            snap.clone()
        };

        self.check_thresholds(&snapshot);

        tracing::debug!(
            cpu = %format_args!("{:.1}", snapshot.cpu_usage_percent),
            mem = %format_args!("{:.1}", snapshot.memory_usage_percent),
            disk = %format_args!("{:.1}", snapshot.disk_usage_percent),
            "Health check complete"
        );
    }

    /// Evaluate thresholds against a snapshot and raise alerts. The dedup
    /// window makes repeated raises across cycles idempotent.
    fn check_thresholds(&self, snapshot: &HealthSnapshot) {
        let disk_pct = snapshot.disk_usage_percent / 100.0;
        if disk_pct >= self.config.disk_crit_threshold {
            self.raise_disk_alert(Severity::Critical, "Critical disk usage", snapshot);
        } else if disk_pct >= self.config.disk_warn_threshold {
            self.raise_disk_alert(Severity::Warning, "High disk usage", snapshot);
        }

        let mem_pct = snapshot.memory_usage_percent / 100.0;
        if mem_pct >= self.config.mem_crit_threshold {
            self.raise_memory_alert(Severity::Critical, "Critical memory usage", snapshot);
        } else if mem_pct >= self.config.mem_warn_threshold {
            self.raise_memory_alert(Severity::Warning, "High memory usage", snapshot);
        }

        if snapshot.security_updates > 0 {
            let mut metadata = BTreeMap::new();
            metadata.insert("count".to_string(), snapshot.security_updates.to_string());
            self.raise(
                Severity::Warning,
                AlertType::SecurityUpdate,
                "Security updates available".to_string(),
                format!("{} security update(s) available", snapshot.security_updates),
                metadata,
            );
        }
    }

    /// Raise one alert for serious CVE exposure found by the last scan.
    fn check_cve_exposure(&self) {
        let critical = self.cve.count_by_severity(CveSeverity::Critical);
        let high = self.cve.count_by_severity(CveSeverity::High);
        if critical + high == 0 {
            return;
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("critical".to_string(), critical.to_string());
        metadata.insert("high".to_string(), high.to_string());
        self.raise(
            if critical > 0 {
                Severity::Critical
            } else {
                Severity::Warning
            },
            AlertType::CveFound,
            "Known vulnerabilities affect installed packages".to_string(),
            format!(
                "{} vulnerability(ies) of high or critical severity found",
                critical + high
            ),
            metadata,
        );
    }

    fn raise_disk_alert(&self, severity: Severity, title: &str, snapshot: &HealthSnapshot) {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "usage_percent".to_string(),
            format!("{}", snapshot.disk_usage_percent as i64),
        );
        metadata.insert("used_gb".to_string(), format!("{:.1}", snapshot.disk_used_gb));
        metadata.insert(
            "total_gb".to_string(),
            format!("{:.1}", snapshot.disk_total_gb),
        );
        self.raise(
            severity,
            AlertType::DiskUsage,
            title.to_string(),
            format!(
                "Disk usage is at {}% on root filesystem",
                snapshot.disk_usage_percent as i64
            ),
            metadata,
        );
    }

    fn raise_memory_alert(&self, severity: Severity, title: &str, snapshot: &HealthSnapshot) {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "usage_percent".to_string(),
            format!("{}", snapshot.memory_usage_percent as i64),
        );
        self.raise(
            severity,
            AlertType::MemoryUsage,
            title.to_string(),
            format!(
                "Memory usage is at {}%",
                snapshot.memory_usage_percent as i64
            ),
            metadata,
        );
    }

    fn raise(
        &self,
        severity: Severity,
        alert_type: AlertType,
        title: String,
        message: String,
        metadata: BTreeMap<String, String>,
    ) {
        let id = self
            .alerts
            .create(severity, alert_type, title, message, metadata);
        if id.is_empty() {
            return;
        }

        if let Some(engine) = &self.engine {
            if engine.is_loaded() {
                enrichment::spawn(engine.clone(), self.alerts.clone(), id);
            }
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
