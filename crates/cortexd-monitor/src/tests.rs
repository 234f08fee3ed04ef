use crate::{MonitorConfig, SystemMonitor};
use anyhow::Result;
use cortexd_alert::AlertManager;
use cortexd_common::types::{AlertType, HealthSnapshot, Severity};
use cortexd_common::Service;
use cortexd_llm::{InferenceRequest, InferenceResult, LlmEngine, ModelInfo};
use cortexd_storage::AlertStore;
use std::sync::Arc;
use tempfile::TempDir;

fn test_config() -> MonitorConfig {
    MonitorConfig {
        check_interval_secs: 1,
        enable_apt_monitor: false,
        ..MonitorConfig::default()
    }
}

fn setup(config: MonitorConfig) -> (TempDir, Arc<AlertManager>, SystemMonitor) {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(&dir.path().join("alerts.db")).unwrap();
    let alerts = Arc::new(AlertManager::new(store));
    let monitor = SystemMonitor::new(config, alerts.clone(), None);
    (dir, alerts, monitor)
}

fn snapshot_with(disk_pct: f64, mem_pct: f64, security: u64) -> HealthSnapshot {
    HealthSnapshot {
        disk_usage_percent: disk_pct,
        disk_used_gb: 450.0,
        disk_total_gb: 500.0,
        memory_usage_percent: mem_pct,
        security_updates: security,
        ..HealthSnapshot::default()
    }
}

#[test]
fn force_check_populates_snapshot() {
    let (_dir, _alerts, monitor) = setup(test_config());

    assert!(monitor.get_snapshot().timestamp.is_none());
    let snapshot = monitor.force_check();

    assert!(snapshot.timestamp.is_some());
    assert!(snapshot.memory_total_mb > 0.0);
    assert!(snapshot.disk_total_gb > 0.0);
    assert!((0.0..=100.0).contains(&snapshot.cpu_usage_percent));
}

#[test]
fn disk_threshold_trip_raises_one_critical_alert() {
    let mut config = test_config();
    config.disk_crit_threshold = 0.9;
    let (_dir, alerts, monitor) = setup(config);

    monitor.inner.check_thresholds(&snapshot_with(95.0, 0.0, 0));

    let active = alerts.get_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, Severity::Critical);
    assert_eq!(active[0].alert_type, AlertType::DiskUsage);
    assert_eq!(active[0].metadata["usage_percent"], "95");
    assert_eq!(active[0].metadata["used_gb"], "450.0");
}

#[test]
fn repeated_threshold_trips_are_deduplicated() {
    let mut config = test_config();
    config.disk_crit_threshold = 0.9;
    let (_dir, alerts, monitor) = setup(config);

    for _ in 0..3 {
        monitor.inner.check_thresholds(&snapshot_with(95.0, 0.0, 0));
    }

    assert_eq!(alerts.count_active(), 1);
}

#[test]
fn warn_band_raises_warning_not_critical() {
    let mut config = test_config();
    config.mem_warn_threshold = 0.80;
    config.mem_crit_threshold = 0.95;
    let (_dir, alerts, monitor) = setup(config);

    monitor.inner.check_thresholds(&snapshot_with(0.0, 85.0, 0));

    let active = alerts.get_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, Severity::Warning);
    assert_eq!(active[0].alert_type, AlertType::MemoryUsage);
    assert_eq!(active[0].message, "Memory usage is at 85%");
}

#[test]
fn below_thresholds_raises_nothing() {
    let (_dir, alerts, monitor) = setup(test_config());
    monitor.inner.check_thresholds(&snapshot_with(50.0, 50.0, 0));
    assert_eq!(alerts.count_active(), 0);
}

#[test]
fn empty_cve_cache_raises_nothing() {
    let (_dir, alerts, monitor) = setup(test_config());
    monitor.inner.check_cve_exposure();
    assert_eq!(alerts.count_active(), 0);
}

#[test]
fn security_updates_raise_a_warning_with_count() {
    let (_dir, alerts, monitor) = setup(test_config());

    monitor.inner.check_thresholds(&snapshot_with(0.0, 0.0, 3));

    let active = alerts.get_by_type(AlertType::SecurityUpdate);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].metadata["count"], "3");
    assert_eq!(active[0].message, "3 security update(s) available");
}

#[tokio::test(flavor = "multi_thread")]
async fn monitor_loop_runs_and_stops_cleanly() {
    let (_dir, _alerts, monitor) = setup(test_config());

    monitor.start().await.unwrap();
    assert!(monitor.is_running());

    // Starting again while running is a no-op.
    monitor.start().await.unwrap();

    // The initial check runs before the first sleep.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let first = monitor.get_snapshot().timestamp.expect("initial check ran");

    // The 1s interval elapses at least once over 2.5s of wall time.
    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    let second = monitor.get_snapshot().timestamp.expect("periodic check ran");
    assert!(second > first);

    monitor.stop().await;
    assert!(!monitor.is_running());
    assert!(!monitor.is_healthy());

    // stop is idempotent and safe to repeat.
    monitor.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn trigger_check_runs_on_next_wakeup() {
    let mut config = test_config();
    config.check_interval_secs = 3600;
    let (_dir, _alerts, monitor) = setup(config);

    monitor.start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let initial = monitor.get_snapshot().timestamp.unwrap();

    monitor.trigger_check();
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let after = monitor.get_snapshot().timestamp.unwrap();
    assert!(after > initial);

    monitor.stop().await;
}

struct CannedEngine;

impl LlmEngine for CannedEngine {
    fn is_loaded(&self) -> bool {
        true
    }

    fn model_info(&self) -> Option<ModelInfo> {
        Some(ModelInfo {
            name: "canned".to_string(),
            path: "/models/canned.gguf".to_string(),
            context_length: 2048,
        })
    }

    fn load(&self, _model_path: &str) -> Result<ModelInfo> {
        Ok(self.model_info().unwrap())
    }

    fn unload(&self) {}

    fn infer_sync(&self, request: &InferenceRequest) -> Result<InferenceResult> {
        assert_eq!(request.max_tokens, 150);
        Ok(InferenceResult {
            text: "Likely log growth under /var/log.".to_string(),
            tokens_generated: 8,
            duration_ms: 12,
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn raised_alerts_get_ai_analysis_companions() {
    let dir = TempDir::new().unwrap();
    let store = AlertStore::open(&dir.path().join("alerts.db")).unwrap();
    let alerts = Arc::new(AlertManager::new(store));
    let mut config = test_config();
    config.disk_crit_threshold = 0.9;
    let monitor = SystemMonitor::new(config, alerts.clone(), Some(Arc::new(CannedEngine)));

    monitor.inner.check_thresholds(&snapshot_with(95.0, 0.0, 0));

    // The enrichment task is detached; poll for its secondary alert.
    let mut analysis = Vec::new();
    for _ in 0..50 {
        analysis = alerts.get_by_type(AlertType::AiAnalysis);
        if !analysis.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    assert_eq!(analysis.len(), 1);
    assert_eq!(analysis[0].severity, Severity::Info);
    assert!(analysis[0].metadata.contains_key("parent_alert_id"));

    let parent = alerts.get(&analysis[0].metadata["parent_alert_id"]).unwrap();
    assert_eq!(parent.alert_type, AlertType::DiskUsage);
}
