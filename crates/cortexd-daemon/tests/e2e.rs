use cortexd_alert::AlertManager;
use cortexd_common::types::{AlertType, Severity};
use cortexd_daemon::config::ConfigHandle;
use cortexd_daemon::daemon::Daemon;
use cortexd_daemon::handlers;
use cortexd_daemon::services::{IpcService, LlmService};
use cortexd_ipc::IpcServer;
use cortexd_llm::{LlmEngine, NullEngine};
use cortexd_monitor::{MonitorConfig, SystemMonitor};
use cortexd_storage::AlertStore;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

struct TestDaemon {
    _dir: TempDir,
    daemon: Daemon,
    alerts: Arc<AlertManager>,
    socket: std::path::PathBuf,
}

async fn spawn_daemon() -> TestDaemon {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("cortexd.sock");

    let config = ConfigHandle::load(&dir.path().join("cortexd.toml")).unwrap();
    let store = AlertStore::open(&dir.path().join("alerts.db")).unwrap();
    let alerts = Arc::new(AlertManager::new(store));
    let engine: Arc<dyn LlmEngine> = Arc::new(NullEngine::new());

    // Thresholds above 100% so the host the tests run on never trips them.
    let monitor = SystemMonitor::new(
        MonitorConfig {
            check_interval_secs: 3600,
            enable_apt_monitor: false,
            enable_cve_scan: false,
            disk_warn_threshold: 2.0,
            disk_crit_threshold: 2.0,
            mem_warn_threshold: 2.0,
            mem_crit_threshold: 2.0,
        },
        alerts.clone(),
        Some(engine.clone()),
    );

    let server = IpcServer::new(&socket, 100);
    let daemon = Daemon::new(config.clone());
    handlers::register_all(
        &server,
        monitor.clone(),
        engine.clone(),
        alerts.clone(),
        config,
        daemon.control(),
    );

    daemon.register(Arc::new(IpcService::new(server)));
    daemon.register(Arc::new(monitor.clone()));
    daemon.register(Arc::new(LlmService::new(engine, monitor, None)));

    daemon.start_all().await.unwrap();

    TestDaemon {
        _dir: dir,
        daemon,
        alerts,
        socket,
    }
}

async fn call(socket: &Path, request: Value) -> Value {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    stream
        .write_all(request.to_string().as_bytes())
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    serde_json::from_slice(&response).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_version_and_status() {
    let td = spawn_daemon().await;

    let response = call(&td.socket, json!({"method": "ping"})).await;
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["pong"], true);

    let response = call(&td.socket, json!({"method": "version"})).await;
    assert_eq!(response["data"]["name"], "cortexd");
    assert!(response["data"]["version"].is_string());

    let response = call(&td.socket, json!({"method": "status"})).await;
    assert_eq!(response["data"]["running"], true);
    assert!(response["data"]["uptime_seconds"].is_u64());
    assert_eq!(response["data"]["llm"]["loaded"], false);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_forces_a_check_when_snapshot_is_empty() {
    let td = spawn_daemon().await;

    let response = call(&td.socket, json!({"method": "health"})).await;
    assert_eq!(response["success"], true);
    // A synchronous check ran, so the timestamp is populated.
    assert!(response["data"]["timestamp"].as_i64().unwrap() > 0);
    assert!(response["data"]["memory_total_mb"].as_f64().unwrap() > 0.0);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn alert_query_ack_and_dismiss_flow() {
    let td = spawn_daemon().await;

    let first = td.alerts.create(
        Severity::Critical,
        AlertType::DiskUsage,
        "Critical disk usage",
        "Disk usage is at 96% on root filesystem",
        BTreeMap::new(),
    );
    let second = td.alerts.create(
        Severity::Warning,
        AlertType::MemoryUsage,
        "High memory usage",
        "Memory usage is at 91%",
        BTreeMap::new(),
    );

    // Acknowledge one; alerts.get then returns a single active alert.
    let response = call(
        &td.socket,
        json!({"method": "alerts.ack", "params": {"id": first.as_str()}}),
    )
    .await;
    assert_eq!(response["success"], true);

    let response = call(&td.socket, json!({"method": "alerts.get"})).await;
    assert_eq!(response["data"]["count"], 1);
    assert_eq!(response["data"]["total_active"], 1);
    assert_eq!(response["data"]["alerts"][0]["id"], second.as_str());

    // Severity filter.
    let response = call(
        &td.socket,
        json!({"method": "alerts.get", "params": {"severity": "warning"}}),
    )
    .await;
    assert_eq!(response["data"]["count"], 1);

    // Dismiss removes the row outright.
    let response = call(
        &td.socket,
        json!({"method": "alerts.dismiss", "params": {"id": second.as_str()}}),
    )
    .await;
    assert_eq!(response["data"]["dismissed"], second.as_str());
    assert_eq!(td.alerts.count_active(), 0);

    // Missing ids surface the dedicated error code.
    let response = call(
        &td.socket,
        json!({"method": "alerts.ack", "params": {"id": "nope"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], 7);

    // Neither id nor all is invalid params.
    let response = call(&td.socket, json!({"method": "alerts.ack"})).await;
    assert_eq!(response["error"]["code"], 2);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_acknowledge_reports_count() {
    let td = spawn_daemon().await;

    for i in 0..3 {
        td.alerts.create(
            Severity::Info,
            AlertType::System,
            format!("bulk {i}"),
            "",
            BTreeMap::new(),
        );
    }

    let response = call(
        &td.socket,
        json!({"method": "alerts.ack", "params": {"all": true}}),
    )
    .await;
    assert_eq!(response["data"]["acknowledged_count"], 3);
    assert_eq!(td.alerts.count_active(), 0);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn config_get_and_reload() {
    let td = spawn_daemon().await;

    let response = call(&td.socket, json!({"method": "config.get"})).await;
    assert_eq!(response["data"]["monitor_interval_sec"], 300);
    assert_eq!(response["data"]["thresholds"]["disk_crit"], 0.95);

    let response = call(&td.socket, json!({"method": "config.reload"})).await;
    assert_eq!(response["data"]["reloaded"], true);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn llm_methods_without_a_backend() {
    let td = spawn_daemon().await;

    let response = call(&td.socket, json!({"method": "llm.status"})).await;
    assert_eq!(response["data"]["loaded"], false);

    let response = call(
        &td.socket,
        json!({"method": "llm.infer", "params": {"prompt": "hi"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], 8);

    let response = call(&td.socket, json!({"method": "llm.load"})).await;
    assert_eq!(response["error"]["code"], 2);

    let response = call(
        &td.socket,
        json!({"method": "llm.load", "params": {"model_path": "/models/x.gguf"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], 4);

    let response = call(&td.socket, json!({"method": "llm.unload"})).await;
    assert_eq!(response["data"]["unloaded"], true);

    td.daemon.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_method_flags_the_daemon_and_responds_first() {
    let td = spawn_daemon().await;
    let control = td.daemon.control();
    assert!(!control.is_shutdown_requested());

    let response = call(&td.socket, json!({"method": "shutdown"})).await;
    assert_eq!(response["data"]["shutdown"], "initiated");
    assert!(control.is_shutdown_requested());

    td.daemon.stop_all().await;
    assert!(!td.socket.exists());
}
