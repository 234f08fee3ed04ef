use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes carried in failed responses.
pub mod error_codes {
    pub const OK: i64 = 0;
    pub const PARSE_ERROR: i64 = 1;
    pub const INVALID_PARAMS: i64 = 2;
    pub const METHOD_NOT_FOUND: i64 = 3;
    pub const INTERNAL_ERROR: i64 = 4;
    pub const RATE_LIMITED: i64 = 5;
    pub const CONFIG_ERROR: i64 = 6;
    pub const ALERT_NOT_FOUND: i64 = 7;
    pub const LLM_NOT_LOADED: i64 = 8;
}

/// The closed set of RPC method names.
pub mod methods {
    pub const PING: &str = "ping";
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const HEALTH: &str = "health";
    pub const ALERTS: &str = "alerts";
    pub const ALERTS_GET: &str = "alerts.get";
    pub const ALERTS_ACK: &str = "alerts.ack";
    pub const ALERTS_DISMISS: &str = "alerts.dismiss";
    pub const CONFIG_GET: &str = "config.get";
    pub const CONFIG_RELOAD: &str = "config.reload";
    pub const LLM_STATUS: &str = "llm.status";
    pub const LLM_LOAD: &str = "llm.load";
    pub const LLM_UNLOAD: &str = "llm.unload";
    pub const LLM_INFER: &str = "llm.infer";
    pub const SHUTDOWN: &str = "shutdown";
}

/// Incoming request envelope: `{"method": "...", "params": {...}, "id": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(Value::as_i64)
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: i64,
}

/// Outgoing response envelope. Exactly one of `data` (success) or `error`
/// is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            id: None,
        }
    }

    pub fn err(message: impl Into<String>, code: i64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                code,
            }),
            id: None,
        }
    }

    /// Echo the request id back on the response.
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"message":"serialization failed","code":4}}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_request() {
        let request = Request::parse(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(request.method, "ping");
        assert!(request.id.is_none());
        assert!(request.params.is_null());
    }

    #[test]
    fn parses_request_with_params_and_id() {
        let request =
            Request::parse(r#"{"method":"alerts.ack","params":{"id":"a1","all":false},"id":"42"}"#)
                .unwrap();
        assert_eq!(request.method, "alerts.ack");
        assert_eq!(request.param_str("id"), Some("a1"));
        assert_eq!(request.param_bool("all"), Some(false));
        assert_eq!(request.id.as_deref(), Some("42"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Request::parse("not json").is_none());
        assert!(Request::parse(r#"{"params":{}}"#).is_none());
        assert!(Request::parse("").is_none());
    }

    #[test]
    fn response_round_trip() {
        let response = Response::ok(json!({"pong": true})).with_id(Some("7".to_string()));
        let restored: Response = serde_json::from_str(&response.to_json()).unwrap();
        assert!(restored.success);
        assert_eq!(restored.data.unwrap()["pong"], true);
        assert_eq!(restored.id.as_deref(), Some("7"));
        assert!(restored.error.is_none());
    }

    #[test]
    fn error_response_carries_stable_code() {
        let response = Response::err("Method not found: xyz", error_codes::METHOD_NOT_FOUND);
        let json: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], 3);
        assert_eq!(json["error"]["message"], "Method not found: xyz");
        assert!(json.get("data").is_none());
    }
}
