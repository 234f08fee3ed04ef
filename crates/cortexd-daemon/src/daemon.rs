use crate::config::ConfigHandle;
use anyhow::{Context, Result};
use cortexd_common::Service;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Process-wide daemon state shared with RPC handlers: the uptime clock
/// and the shutdown-requested flag.
pub struct DaemonControl {
    started_at: Instant,
    shutdown_requested: AtomicBool,
}

impl DaemonControl {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl Default for DaemonControl {
    fn default() -> Self {
        Self::new()
    }
}

/// The service registry and orchestrator.
///
/// Services start in descending priority order; a start failure stops the
/// already-started services in reverse and aborts. Shutdown walks the
/// registry in ascending priority order.
pub struct Daemon {
    services: Mutex<Vec<Arc<dyn Service>>>,
    control: Arc<DaemonControl>,
    config: ConfigHandle,
}

impl Daemon {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            services: Mutex::new(Vec::new()),
            control: Arc::new(DaemonControl::new()),
            config,
        }
    }

    pub fn control(&self) -> Arc<DaemonControl> {
        self.control.clone()
    }

    pub fn register(&self, service: Arc<dyn Service>) {
        tracing::debug!(
            service = service.name(),
            priority = service.priority(),
            "Service registered"
        );
        self.lock_services().push(service);
    }

    pub async fn start_all(&self) -> Result<()> {
        let mut services = self.lock_services().clone();
        services.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        let mut started: Vec<Arc<dyn Service>> = Vec::new();
        for service in services {
            if service.is_running() {
                continue;
            }
            match service.start().await {
                Ok(()) => {
                    tracing::info!(service = service.name(), "Service started");
                    started.push(service);
                }
                Err(e) => {
                    tracing::error!(
                        service = service.name(),
                        error = %e,
                        "Service failed to start, rolling back"
                    );
                    for prior in started.iter().rev() {
                        prior.stop().await;
                    }
                    return Err(e).with_context(|| format!("{} failed to start", service.name()));
                }
            }
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        let mut services = self.lock_services().clone();
        services.sort_by_key(|s| s.priority());

        for service in services {
            service.stop().await;
            tracing::info!(service = service.name(), "Service stopped");
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.lock_services().iter().all(|s| s.is_healthy())
    }

    /// Re-read the configuration file. Returns whether the reload took
    /// effect.
    pub fn reload_config(&self) -> bool {
        match self.config.reload() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Configuration reload failed");
                false
            }
        }
    }

    fn lock_services(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Service>>> {
        self.services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;

    struct RecordingService {
        name: &'static str,
        priority: i32,
        fail_start: bool,
        running: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingService {
        fn new(
            name: &'static str,
            priority: i32,
            fail_start: bool,
            log: Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                fail_start,
                running: AtomicBool::new(false),
                log,
            })
        }
    }

    #[async_trait]
    impl Service for RecordingService {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                anyhow::bail!("induced start failure");
            }
            self.running.store(true, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("stop {}", self.name));
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn test_daemon() -> Daemon {
        Daemon::new(ConfigHandle::load(Path::new("/nonexistent/cortexd.toml")).unwrap())
    }

    #[tokio::test]
    async fn services_start_by_descending_priority_and_stop_in_reverse() {
        let daemon = test_daemon();
        let log = Arc::new(Mutex::new(Vec::new()));

        daemon.register(RecordingService::new("monitor", 50, false, log.clone()));
        daemon.register(RecordingService::new("ipc", 100, false, log.clone()));
        daemon.register(RecordingService::new("llm", 10, false, log.clone()));

        daemon.start_all().await.unwrap();
        daemon.stop_all().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start ipc",
                "start monitor",
                "start llm",
                "stop llm",
                "stop monitor",
                "stop ipc",
            ]
        );
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_services() {
        let daemon = test_daemon();
        let log = Arc::new(Mutex::new(Vec::new()));

        daemon.register(RecordingService::new("ipc", 100, false, log.clone()));
        daemon.register(RecordingService::new("monitor", 50, true, log.clone()));
        daemon.register(RecordingService::new("llm", 10, false, log.clone()));

        assert!(daemon.start_all().await.is_err());

        // The failing service aborted startup: llm never started and the
        // already-started ipc service was stopped again.
        assert_eq!(*log.lock().unwrap(), vec!["start ipc", "stop ipc"]);
    }

    #[tokio::test]
    async fn already_running_services_are_not_restarted() {
        let daemon = test_daemon();
        let log = Arc::new(Mutex::new(Vec::new()));

        let service = RecordingService::new("ipc", 100, false, log.clone());
        daemon.register(service.clone());

        daemon.start_all().await.unwrap();
        daemon.start_all().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["start ipc"]);
    }

    #[test]
    fn control_tracks_shutdown_requests() {
        let control = DaemonControl::new();
        assert!(!control.is_shutdown_requested());
        control.request_shutdown();
        assert!(control.is_shutdown_requested());
    }
}
