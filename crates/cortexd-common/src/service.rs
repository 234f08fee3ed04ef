use anyhow::Result;
use async_trait::async_trait;

/// Lifecycle contract for every long-running daemon component.
///
/// Services are registered with the daemon shell, which starts them in
/// descending [`priority`](Service::priority) order and stops them in the
/// reverse order. `stop` must be idempotent and safe to call on a service
/// that never started.
#[async_trait]
pub trait Service: Send + Sync {
    /// Component name used in log records.
    fn name(&self) -> &str;

    /// Startup order: higher starts first, shuts down last.
    ///
    /// Suggested priorities: 100 for the IPC server (must accept
    /// connections first), 50 for the system monitor, 10 for the LLM
    /// engine.
    fn priority(&self) -> i32 {
        0
    }

    /// Begin operation. An error aborts daemon startup and triggers
    /// reverse-order shutdown of already-started services.
    async fn start(&self) -> Result<()>;

    /// Graceful shutdown.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    fn is_healthy(&self) -> bool {
        true
    }
}
