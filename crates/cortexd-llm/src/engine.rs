use crate::models::{InferenceRequest, InferenceResult, ModelInfo};
use anyhow::{bail, Result};
use serde_json::json;

/// Opaque inference engine surface.
///
/// Implementations wrap whatever backend hosts the model; cortexd only
/// requires synchronous inference bounded by the request's `max_tokens`
/// and the engine's own timeout contract. All methods must be callable
/// from any thread.
pub trait LlmEngine: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn model_info(&self) -> Option<ModelInfo>;

    /// Load the model at `model_path`, replacing any loaded model.
    fn load(&self, model_path: &str) -> Result<ModelInfo>;

    /// Unload the current model. A no-op when nothing is loaded.
    fn unload(&self);

    /// Run one inference call to completion.
    fn infer_sync(&self, request: &InferenceRequest) -> Result<InferenceResult>;

    /// Engine status as reported over RPC.
    fn status(&self) -> serde_json::Value {
        json!({
            "loaded": self.is_loaded(),
            "model": self.model_info().map(|m| m.to_json()),
            "queue_size": self.queue_size(),
        })
    }

    /// Depth of the engine's pending-inference queue.
    fn queue_size(&self) -> u64 {
        0
    }
}

/// Engine used when no inference backend is configured: reports unloaded
/// and fails load and inference.
pub struct NullEngine;

impl NullEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmEngine for NullEngine {
    fn is_loaded(&self) -> bool {
        false
    }

    fn model_info(&self) -> Option<ModelInfo> {
        None
    }

    fn load(&self, model_path: &str) -> Result<ModelInfo> {
        tracing::warn!(model_path, "No inference backend available");
        bail!("no inference backend available")
    }

    fn unload(&self) {}

    fn infer_sync(&self, _request: &InferenceRequest) -> Result<InferenceResult> {
        bail!("no inference backend available")
    }
}
