//! The cortexd daemon shell: configuration, the priority-ordered service
//! registry, the RPC handler surface, and the service adapters that bind
//! the IPC server and LLM engine into the shared lifecycle contract.

pub mod config;
pub mod daemon;
pub mod handlers;
pub mod services;

pub const NAME: &str = "cortexd";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
