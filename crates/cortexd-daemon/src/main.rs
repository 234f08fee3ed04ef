use anyhow::Result;
use chrono::Duration as ChronoDuration;
use cortexd_alert::AlertManager;
use cortexd_daemon::config::ConfigHandle;
use cortexd_daemon::daemon::Daemon;
use cortexd_daemon::services::{IpcService, LlmService};
use cortexd_daemon::{handlers, NAME, VERSION};
use cortexd_ipc::IpcServer;
use cortexd_llm::{LlmEngine, NullEngine};
use cortexd_monitor::{MonitorConfig, SystemMonitor};
use cortexd_storage::AlertStore;
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/cortex/cortexd.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ConfigHandle::load(Path::new(&config_path))?;
    let cfg = config.get();

    // All logging goes to stderr; stdout stays silent after startup.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("cortexd={}", cfg.log_level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = VERSION,
        config = %config_path,
        socket = %cfg.socket_path,
        alert_db = %cfg.alert_db_path,
        "{NAME} starting"
    );

    // Build components leaves-first: store, manager, engine, monitor,
    // server. The manager is shared between the monitor and the handlers
    // and outlives both.
    let store = AlertStore::open(Path::new(&cfg.alert_db_path))?;
    let alerts = Arc::new(AlertManager::with_dedup_window(
        store,
        ChronoDuration::seconds(cfg.dedup_window_secs as i64),
    ));

    let engine: Arc<dyn LlmEngine> = Arc::new(NullEngine::new());

    let monitor = SystemMonitor::new(
        MonitorConfig {
            check_interval_secs: cfg.monitor_interval_secs,
            enable_apt_monitor: cfg.enable_apt_monitor,
            enable_cve_scan: cfg.enable_cve_scan,
            disk_warn_threshold: cfg.disk_warn_threshold,
            disk_crit_threshold: cfg.disk_crit_threshold,
            mem_warn_threshold: cfg.mem_warn_threshold,
            mem_crit_threshold: cfg.mem_crit_threshold,
        },
        alerts.clone(),
        Some(engine.clone()),
    );

    let server = IpcServer::new(&cfg.socket_path, cfg.max_requests_per_sec);

    let daemon = Daemon::new(config.clone());
    let control = daemon.control();

    handlers::register_all(
        &server,
        monitor.clone(),
        engine.clone(),
        alerts.clone(),
        config.clone(),
        control.clone(),
    );

    daemon.register(Arc::new(IpcService::new(server)));
    daemon.register(Arc::new(monitor.clone()));
    daemon.register(Arc::new(LlmService::new(
        engine,
        monitor,
        cfg.model_path.clone(),
    )));

    daemon.start_all().await?;
    tracing::info!("All services started");

    // Hourly retention sweep over resolved alerts.
    let retention = ChronoDuration::hours(cfg.alert_retention_hours as i64);
    let cleanup_alerts = alerts.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        tick.tick().await;
        loop {
            tick.tick().await;
            let removed = cleanup_alerts.cleanup_old(retention);
            if removed > 0 {
                tracing::info!(removed, "Cleaned up old resolved alerts");
            }
        }
    });

    wait_for_shutdown(&control).await;

    daemon.stop_all().await;
    cleanup_handle.abort();
    tracing::info!("{NAME} stopped");
    Ok(())
}

/// Block until a termination signal arrives or a handler requests
/// shutdown. The IPC flag is polled on one-second boundaries, matching the
/// cooperative cancellation used elsewhere.
async fn wait_for_shutdown(control: &cortexd_daemon::daemon::DaemonControl) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Cannot install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Cannot install SIGINT handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if control.is_shutdown_requested() {
                    tracing::info!("Shutdown requested, stopping services");
                    break;
                }
            }
        }
    }
}
