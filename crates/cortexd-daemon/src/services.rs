//! [`Service`] adapters binding the IPC server and the LLM engine into
//! the daemon's lifecycle contract.

use anyhow::Result;
use async_trait::async_trait;
use cortexd_common::Service;
use cortexd_ipc::IpcServer;
use cortexd_llm::LlmEngine;
use cortexd_monitor::SystemMonitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The IPC server under the shared lifecycle. Highest priority: it must
/// accept connections before anything else is up, and go away last.
pub struct IpcService {
    server: IpcServer,
}

impl IpcService {
    pub fn new(server: IpcServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Service for IpcService {
    fn name(&self) -> &str {
        "IPCServer"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn start(&self) -> Result<()> {
        self.server.start().await
    }

    async fn stop(&self) {
        self.server.stop().await;
    }

    fn is_running(&self) -> bool {
        self.server.is_running()
    }

    fn is_healthy(&self) -> bool {
        self.server.is_healthy()
    }
}

/// The inference engine under the shared lifecycle.
///
/// When a model path is configured it is loaded at startup; a load failure
/// is logged but does not abort the daemon, since models can also be
/// loaded later over RPC.
pub struct LlmService {
    engine: Arc<dyn LlmEngine>,
    monitor: SystemMonitor,
    model_path: Option<String>,
    running: AtomicBool,
}

impl LlmService {
    pub fn new(
        engine: Arc<dyn LlmEngine>,
        monitor: SystemMonitor,
        model_path: Option<String>,
    ) -> Self {
        Self {
            engine,
            monitor,
            model_path,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Service for LlmService {
    fn name(&self) -> &str {
        "LLMEngine"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        if let Some(path) = &self.model_path {
            match self.engine.load(path) {
                Ok(info) => {
                    self.monitor
                        .set_llm_state(true, &info.name, self.engine.queue_size());
                    tracing::info!(model = %info.name, "Model loaded at startup");
                }
                Err(e) => {
                    tracing::warn!(model_path = %path, error = %e, "Startup model load failed");
                }
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.engine.unload();
        self.monitor.set_llm_state(false, "", 0);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
