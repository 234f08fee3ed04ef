use crate::protocol::{error_codes, Request, Response};
use crate::rate_limit::RateLimiter;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Largest request accepted on one connection.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Per-connection receive and send deadline.
pub const SOCKET_TIMEOUT_MS: u64 = 5000;

/// `sockaddr_un.sun_path` capacity minus the trailing NUL.
const SUN_PATH_MAX: usize = 107;

/// A registered RPC method handler.
pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Unix-socket RPC server. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct IpcServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    socket_path: PathBuf,
    rate_limiter: RateLimiter,
    handlers: RwLock<HashMap<String, Handler>>,
    running: AtomicBool,
    listening: AtomicBool,
    in_flight: AtomicU64,
    connections_served: AtomicU64,
    drained: Notify,
    shutdown: Notify,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<PathBuf>, max_requests_per_sec: u32) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                socket_path: socket_path.into(),
                rate_limiter: RateLimiter::new(max_requests_per_sec),
                handlers: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                listening: AtomicBool::new(false),
                in_flight: AtomicU64::new(0),
                connections_served: AtomicU64::new(0),
                drained: Notify::new(),
                shutdown: Notify::new(),
                accept_task: Mutex::new(None),
            }),
        }
    }

    /// Register (or replace) the handler for a method name. Safe to call
    /// while the server is running, including from inside another handler.
    pub fn register_handler(
        &self,
        method: impl Into<String>,
        handler: impl Fn(&Request) -> Response + Send + Sync + 'static,
    ) {
        let method = method.into();
        tracing::debug!(method = %method, "Registered handler");
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(method, Arc::new(handler));
    }

    pub fn socket_path(&self) -> &Path {
        &self.inner.socket_path
    }

    pub fn connections_served(&self) -> u64 {
        self.inner.connections_served.load(Ordering::Relaxed)
    }

    /// Bind the socket and begin accepting connections.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let path = &self.inner.socket_path;
        if path.as_os_str().as_bytes().len() > SUN_PATH_MAX {
            bail!(
                "socket path too long: {} (max {} bytes)",
                path.display(),
                SUN_PATH_MAX
            );
        }

        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("cannot remove stale socket {}", path.display()))?;
            tracing::debug!("Removed stale socket file");
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("cannot bind {}", path.display()))?;

        // Local-only socket: the parent directory is the access control.
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666)) {
            tracing::warn!(error = %e, "Failed to set socket permissions");
        }

        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.listening.store(true, Ordering::SeqCst);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { accept_loop(inner, listener).await });
        *self
            .inner
            .accept_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        tracing::info!(path = %path.display(), "IPC server started");
        Ok(())
    }

    /// Stop accepting, drain in-flight handlers, and unlink the socket.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // notify_one leaves a permit, so the accept loop sees the shutdown
        // even if it is not parked on notified() at this instant.
        self.inner.shutdown.notify_one();

        let handle = self
            .inner
            .accept_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // No handler may still be executing once stop returns.
        while self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            let notified = self.inner.drained.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        if self.inner.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.inner.socket_path) {
                tracing::warn!(error = %e, "Failed to remove socket file");
            }
        }

        tracing::info!("IPC server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && self.inner.listening.load(Ordering::SeqCst)
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: UnixListener) {
    tracing::debug!("Accept loop started");

    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => break,
            result = listener.accept() => match result {
                Ok((stream, _addr)) => {
                    inner.in_flight.fetch_add(1, Ordering::SeqCst);
                    inner.connections_served.fetch_add(1, Ordering::Relaxed);
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        handle_client(&inner, stream).await;
                        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                        inner.drained.notify_waiters();
                    });
                }
                Err(e) => {
                    if inner.running.load(Ordering::SeqCst) {
                        tracing::error!(error = %e, "Accept failed");
                    } else {
                        break;
                    }
                }
            }
        }
    }

    inner.listening.store(false, Ordering::SeqCst);
    tracing::debug!("Accept loop ended");
}

/// One request/response exchange, then the connection closes.
async fn handle_client(inner: &ServerInner, mut stream: UnixStream) {
    let deadline = Duration::from_millis(SOCKET_TIMEOUT_MS);

    let mut buffer = vec![0u8; MAX_MESSAGE_SIZE];
    let bytes = match tokio::time::timeout(deadline, stream.read(&mut buffer)).await {
        Ok(Ok(0)) => {
            tracing::debug!("Client disconnected without data");
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Receive failed");
            return;
        }
        Err(_) => {
            tracing::debug!("Receive timed out");
            return;
        }
    };
    tracing::debug!(bytes, "Received request");

    if !inner.rate_limiter.allow() {
        tracing::warn!("Rate limit exceeded");
        let response = Response::err("Rate limit exceeded", error_codes::RATE_LIMITED);
        send_response(&mut stream, &response, deadline).await;
        return;
    }

    let raw = String::from_utf8_lossy(&buffer[..bytes]);
    let response = match Request::parse(&raw) {
        None => Response::err("Invalid request format", error_codes::PARSE_ERROR),
        Some(request) => {
            let id = request.id.clone();
            dispatch(inner, &request).with_id(id)
        }
    };

    send_response(&mut stream, &response, deadline).await;
}

/// Look up and invoke the handler. The handler runs outside the registry
/// lock, so it may itself register handlers, and panics are converted into
/// error responses.
fn dispatch(inner: &ServerInner, request: &Request) -> Response {
    let handler = {
        let handlers = inner
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match handlers.get(&request.method) {
            Some(handler) => handler.clone(),
            None => {
                tracing::warn!(method = %request.method, "Unknown method");
                return Response::err(
                    format!("Method not found: {}", request.method),
                    error_codes::METHOD_NOT_FOUND,
                );
            }
        }
    };

    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(request))) {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(method = %request.method, "Handler panicked");
            Response::err("Internal handler error", error_codes::INTERNAL_ERROR)
        }
    }
}

async fn send_response(stream: &mut UnixStream, response: &Response, deadline: Duration) {
    let payload = response.to_json();
    match tokio::time::timeout(deadline, stream.write_all(payload.as_bytes())).await {
        Ok(Ok(())) => {
            tracing::debug!(bytes = payload.len(), "Sent response");
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to send response");
        }
        Err(_) => {
            tracing::error!("Send timed out");
        }
    }
}
