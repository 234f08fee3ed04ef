//! The RPC method surface. Handlers hold shared handles to the monitor,
//! alert manager, engine, config, and daemon control; each one transforms
//! dynamic request params into typed calls and wraps the result in a
//! response envelope.

use crate::config::ConfigHandle;
use crate::daemon::DaemonControl;
use cortexd_alert::AlertManager;
use cortexd_common::types::{AlertType, Severity};
use cortexd_ipc::{error_codes, methods, IpcServer, Request, Response};
use cortexd_llm::{InferenceRequest, LlmEngine};
use cortexd_monitor::SystemMonitor;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_ALERT_LIMIT: usize = 100;

/// Register every RPC method on the server.
pub fn register_all(
    server: &IpcServer,
    monitor: SystemMonitor,
    engine: Arc<dyn LlmEngine>,
    alerts: Arc<AlertManager>,
    config: ConfigHandle,
    control: Arc<DaemonControl>,
) {
    server.register_handler(methods::PING, |_req| Response::ok(json!({"pong": true})));

    server.register_handler(methods::VERSION, |_req| {
        Response::ok(json!({"version": crate::VERSION, "name": crate::NAME}))
    });

    {
        let monitor = monitor.clone();
        let engine = engine.clone();
        let control = control.clone();
        server.register_handler(methods::STATUS, move |_req| {
            Response::ok(json!({
                "version": crate::VERSION,
                "uptime_seconds": control.uptime_seconds(),
                "running": !control.is_shutdown_requested(),
                "health": monitor.get_snapshot().to_json(),
                "llm": engine.status(),
            }))
        });
    }

    {
        let monitor = monitor.clone();
        let engine = engine.clone();
        server.register_handler(methods::HEALTH, move |_req| {
            let mut snapshot = monitor.get_snapshot();
            // A zero timestamp means no cycle has completed yet.
            if snapshot.timestamp.is_none() {
                tracing::debug!("Snapshot empty, forcing health check");
                snapshot = monitor.force_check();
            }
            snapshot.llm_loaded = engine.is_loaded();
            snapshot.llm_model_name = engine.model_info().map(|m| m.name).unwrap_or_default();
            Response::ok(snapshot.to_json())
        });
    }

    for method in [methods::ALERTS, methods::ALERTS_GET] {
        let alerts = alerts.clone();
        server.register_handler(method, move |req| handle_alerts(req, &alerts));
    }

    {
        let alerts = alerts.clone();
        server.register_handler(methods::ALERTS_ACK, move |req| {
            if let Some(id) = req.param_str("id") {
                return if alerts.acknowledge(id) {
                    Response::ok(json!({"acknowledged": id}))
                } else {
                    Response::err("Alert not found", error_codes::ALERT_NOT_FOUND)
                };
            }
            if req.param_bool("all") == Some(true) {
                let count = alerts.acknowledge_all();
                return Response::ok(json!({"acknowledged_count": count}));
            }
            Response::err("Missing 'id' or 'all' parameter", error_codes::INVALID_PARAMS)
        });
    }

    {
        let alerts = alerts.clone();
        server.register_handler(methods::ALERTS_DISMISS, move |req| {
            let Some(id) = req.param_str("id") else {
                return Response::err("Missing 'id' parameter", error_codes::INVALID_PARAMS);
            };
            if alerts.dismiss(id) {
                Response::ok(json!({"dismissed": id}))
            } else {
                Response::err("Alert not found", error_codes::ALERT_NOT_FOUND)
            }
        });
    }

    {
        let config = config.clone();
        server.register_handler(methods::CONFIG_GET, move |_req| {
            Response::ok(config.get().to_json())
        });
    }

    {
        let config = config.clone();
        server.register_handler(methods::CONFIG_RELOAD, move |_req| match config.reload() {
            Ok(()) => Response::ok(json!({"reloaded": true})),
            Err(e) => {
                tracing::error!(error = %e, "Configuration reload failed");
                Response::err("Failed to reload configuration", error_codes::CONFIG_ERROR)
            }
        });
    }

    {
        let engine = engine.clone();
        server.register_handler(methods::LLM_STATUS, move |_req| Response::ok(engine.status()));
    }

    {
        let engine = engine.clone();
        let monitor = monitor.clone();
        server.register_handler(methods::LLM_LOAD, move |req| {
            let Some(model_path) = req.param_str("model_path") else {
                return Response::err(
                    "Missing 'model_path' parameter",
                    error_codes::INVALID_PARAMS,
                );
            };
            match engine.load(model_path) {
                Ok(info) => {
                    monitor.set_llm_state(true, &info.name, engine.queue_size());
                    Response::ok(json!({"loaded": true, "model": info.to_json()}))
                }
                Err(e) => Response::err(
                    format!("Failed to load model: {e}"),
                    error_codes::INTERNAL_ERROR,
                ),
            }
        });
    }

    {
        let engine = engine.clone();
        let monitor = monitor.clone();
        server.register_handler(methods::LLM_UNLOAD, move |_req| {
            engine.unload();
            monitor.set_llm_state(false, "", 0);
            Response::ok(json!({"unloaded": true}))
        });
    }

    {
        let engine = engine.clone();
        server.register_handler(methods::LLM_INFER, move |req| {
            if !engine.is_loaded() {
                return Response::err("Model not loaded", error_codes::LLM_NOT_LOADED);
            }
            let Some(prompt) = req.param_str("prompt") else {
                return Response::err("Missing 'prompt' parameter", error_codes::INVALID_PARAMS);
            };

            let mut request = InferenceRequest::new(prompt);
            if let Some(max_tokens) = req.param_i64("max_tokens") {
                request.max_tokens = max_tokens.max(0) as usize;
            }
            if let Some(temperature) = req.param_f64("temperature") {
                request.temperature = temperature as f32;
            }
            if let Some(top_p) = req.param_f64("top_p") {
                request.top_p = top_p as f32;
            }
            if let Some(stop) = req.param_str("stop") {
                request.stop = Some(stop.to_string());
            }

            match engine.infer_sync(&request) {
                Ok(result) => Response::ok(result.to_json()),
                Err(e) => Response::err(format!("Inference failed: {e}"), error_codes::INTERNAL_ERROR),
            }
        });
    }

    {
        let control = control.clone();
        server.register_handler(methods::SHUTDOWN, move |_req| {
            tracing::info!("Shutdown requested via IPC");
            control.request_shutdown();
            Response::ok(json!({"shutdown": "initiated"}))
        });
    }
}

fn handle_alerts(req: &Request, alerts: &AlertManager) -> Response {
    let limit = req
        .param_i64("limit")
        .map(|l| l.max(0) as usize)
        .unwrap_or(DEFAULT_ALERT_LIMIT);

    let mut list = if let Some(severity) = req.param_str("severity") {
        let Ok(severity) = severity.parse::<Severity>() else {
            return Response::err("Invalid 'severity' parameter", error_codes::INVALID_PARAMS);
        };
        alerts.get_by_severity(severity)
    } else if let Some(alert_type) = req.param_str("type") {
        let Ok(alert_type) = alert_type.parse::<AlertType>() else {
            return Response::err("Invalid 'type' parameter", error_codes::INVALID_PARAMS);
        };
        alerts.get_by_type(alert_type)
    } else {
        alerts.get_active()
    };

    list.truncate(limit);
    let alerts_json: Vec<serde_json::Value> = list.iter().map(|a| a.to_json()).collect();
    let count = alerts_json.len();

    Response::ok(json!({
        "alerts": alerts_json,
        "count": count,
        "total_active": alerts.count_active(),
    }))
}
