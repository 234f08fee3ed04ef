//! Unix-domain-socket RPC for the daemon.
//!
//! One JSON request and one JSON response per connection, dispatched
//! through a registry of named method handlers behind a fixed-window rate
//! limiter. The server drains in-flight handlers before `stop` returns and
//! unlinks the socket path on shutdown.

pub mod protocol;
pub mod rate_limit;
pub mod server;

pub use protocol::{error_codes, methods, Request, Response};
pub use rate_limit::RateLimiter;
pub use server::{IpcServer, MAX_MESSAGE_SIZE, SOCKET_TIMEOUT_MS};
