//! Detached AI enrichment of raised alerts.
//!
//! The task holds only shared handles to the engine and the alert manager,
//! never the monitor, so monitor teardown is not blocked by an in-flight
//! inference.

use cortexd_alert::AlertManager;
use cortexd_common::types::{AlertType, Severity};
use cortexd_llm::prompt::enrichment_prompt;
use cortexd_llm::{InferenceRequest, LlmEngine};
use std::collections::BTreeMap;
use std::sync::Arc;

const ENRICHMENT_MAX_TOKENS: usize = 150;
const ENRICHMENT_TEMPERATURE: f32 = 0.3;

/// Spawn one background enrichment task for the alert with the given id.
pub fn spawn(engine: Arc<dyn LlmEngine>, alerts: Arc<AlertManager>, alert_id: String) {
    tokio::spawn(async move {
        enrich(engine, alerts, &alert_id);
    });
}

fn enrich(engine: Arc<dyn LlmEngine>, alerts: Arc<AlertManager>, alert_id: &str) {
    let Some(alert) = alerts.get(alert_id) else {
        tracing::debug!(alert_id, "Alert vanished before enrichment");
        return;
    };

    let request = InferenceRequest {
        prompt: enrichment_prompt(&alert),
        max_tokens: ENRICHMENT_MAX_TOKENS,
        temperature: ENRICHMENT_TEMPERATURE,
        ..InferenceRequest::default()
    };

    match engine.infer_sync(&request) {
        Ok(result) => {
            let mut metadata = BTreeMap::new();
            metadata.insert("parent_alert_id".to_string(), alert_id.to_string());

            let analysis_id = alerts.create(
                Severity::Info,
                AlertType::AiAnalysis,
                format!("Analysis: {}", alert.title),
                result.text,
                metadata,
            );
            if analysis_id.is_empty() {
                tracing::debug!(parent = alert_id, "Analysis alert suppressed");
            } else {
                tracing::info!(
                    parent = alert_id,
                    analysis = %analysis_id,
                    tokens = result.tokens_generated,
                    "Alert enriched with AI analysis"
                );
            }
        }
        Err(e) => {
            tracing::warn!(alert_id, error = %e, "Alert enrichment failed");
        }
    }
}
