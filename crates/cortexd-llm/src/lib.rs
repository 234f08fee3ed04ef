//! The daemon's boundary to a locally-hosted inference engine.
//!
//! The engine itself is an external collaborator; cortexd only depends on
//! the [`LlmEngine`] trait surface (load/unload, synchronous inference,
//! status). [`NullEngine`] serves deployments without an inference
//! backend, and [`prompt`] builds the per-alert-type enrichment prompts
//! used by the monitor.

pub mod engine;
pub mod models;
pub mod prompt;

pub use engine::{LlmEngine, NullEngine};
pub use models::{InferenceRequest, InferenceResult, ModelInfo};
