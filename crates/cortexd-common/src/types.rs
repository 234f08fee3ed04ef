use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Integer code used in the alerts table.
    pub fn code(self) -> i64 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Severity::Critical,
            1 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Closed set of alert domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DiskUsage,
    MemoryUsage,
    CpuUsage,
    SecurityUpdate,
    CveFound,
    AiAnalysis,
    System,
}

impl AlertType {
    /// Integer code used in the alerts table.
    pub fn code(self) -> i64 {
        match self {
            AlertType::DiskUsage => 0,
            AlertType::MemoryUsage => 1,
            AlertType::CpuUsage => 2,
            AlertType::SecurityUpdate => 3,
            AlertType::CveFound => 4,
            AlertType::AiAnalysis => 5,
            AlertType::System => 6,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => AlertType::DiskUsage,
            1 => AlertType::MemoryUsage,
            2 => AlertType::CpuUsage,
            3 => AlertType::SecurityUpdate,
            4 => AlertType::CveFound,
            5 => AlertType::AiAnalysis,
            _ => AlertType::System,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::DiskUsage => "disk_usage",
            AlertType::MemoryUsage => "memory_usage",
            AlertType::CpuUsage => "cpu_usage",
            AlertType::SecurityUpdate => "security_update",
            AlertType::CveFound => "cve_found",
            AlertType::AiAnalysis => "ai_analysis",
            AlertType::System => "system",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disk_usage" => Ok(AlertType::DiskUsage),
            "memory_usage" => Ok(AlertType::MemoryUsage),
            "cpu_usage" => Ok(AlertType::CpuUsage),
            "security_update" => Ok(AlertType::SecurityUpdate),
            "cve_found" => Ok(AlertType::CveFound),
            "ai_analysis" => Ok(AlertType::AiAnalysis),
            "system" => Ok(AlertType::System),
            _ => Err(format!("unknown alert type: {s}")),
        }
    }
}

/// A persisted notable event.
///
/// `id` and `timestamp` are immutable after creation; `acknowledged` and
/// `resolved` are independent flags, and an alert never transitions back
/// from resolved to active.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: String,
}

impl Alert {
    pub fn new(
        severity: Severity,
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: crate::id::next_id(),
            timestamp: Utc::now(),
            severity,
            alert_type,
            title: title.into(),
            message: message.into(),
            metadata,
            acknowledged: false,
            resolved: false,
            acknowledged_at: None,
            resolved_at: None,
            resolution: String::new(),
        }
    }

    /// Wire representation. Timestamps are Unix seconds; the acknowledgement
    /// and resolution fields appear only when the corresponding flag is set.
    pub fn to_json(&self) -> serde_json::Value {
        let mut j = json!({
            "id": self.id,
            "timestamp": self.timestamp.timestamp(),
            "severity": self.severity.to_string(),
            "type": self.alert_type.to_string(),
            "title": self.title,
            "message": self.message,
            "acknowledged": self.acknowledged,
            "resolved": self.resolved,
        });
        let obj = j.as_object_mut().expect("alert json is an object");
        if !self.metadata.is_empty() {
            obj.insert("metadata".to_string(), json!(self.metadata));
        }
        if self.acknowledged {
            let at = self.acknowledged_at.map(|t| t.timestamp()).unwrap_or(0);
            obj.insert("acknowledged_at".to_string(), json!(at));
        }
        if self.resolved {
            let at = self.resolved_at.map(|t| t.timestamp()).unwrap_or(0);
            obj.insert("resolved_at".to_string(), json!(at));
            obj.insert("resolution".to_string(), json!(self.resolution));
        }
        j
    }

    pub fn from_json(j: &serde_json::Value) -> Option<Self> {
        let ts = |v: Option<&serde_json::Value>| -> Option<DateTime<Utc>> {
            v.and_then(|v| v.as_i64())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        };

        let metadata = j
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id: j.get("id")?.as_str()?.to_string(),
            timestamp: ts(j.get("timestamp"))?,
            severity: j.get("severity")?.as_str()?.parse().ok()?,
            alert_type: j.get("type")?.as_str()?.parse().ok()?,
            title: j.get("title")?.as_str()?.to_string(),
            message: j.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            metadata,
            acknowledged: j.get("acknowledged").and_then(|v| v.as_bool()).unwrap_or(false),
            resolved: j.get("resolved").and_then(|v| v.as_bool()).unwrap_or(false),
            acknowledged_at: ts(j.get("acknowledged_at")),
            resolved_at: ts(j.get("resolved_at")),
            resolution: j
                .get("resolution")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        })
    }
}

/// Value aggregate produced by each monitor cycle. Owned by the monitor
/// behind a mutex; consumers receive copies.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    /// None until the first check completes.
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub pending_updates: u64,
    pub security_updates: u64,
    pub active_alerts: u64,
    pub critical_alerts: u64,
    pub llm_loaded: bool,
    pub llm_model_name: String,
    pub inference_queue_size: u64,
}

impl HealthSnapshot {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "timestamp": self.timestamp.map(|t| t.timestamp()).unwrap_or(0),
            "cpu_usage_percent": self.cpu_usage_percent,
            "memory_usage_percent": self.memory_usage_percent,
            "disk_usage_percent": self.disk_usage_percent,
            "memory_used_mb": self.memory_used_mb,
            "memory_total_mb": self.memory_total_mb,
            "disk_used_gb": self.disk_used_gb,
            "disk_total_gb": self.disk_total_gb,
            "pending_updates": self.pending_updates,
            "security_updates": self.security_updates,
            "active_alerts": self.active_alerts,
            "critical_alerts": self.critical_alerts,
            "llm_loaded": self.llm_loaded,
            "llm_model_name": self.llm_model_name,
            "inference_queue_size": self.inference_queue_size,
        })
    }
}

/// A pending package upgrade reported by the apt collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUpdate {
    pub name: String,
    pub current_version: String,
    pub available_version: String,
    pub source: String,
    pub is_security: bool,
}

impl std::fmt::Display for PackageUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}{}",
            self.name,
            self.current_version,
            self.available_version,
            if self.is_security { " [security]" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CveSeverity {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl std::str::FromStr for CveSeverity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "low" | "negligible" => CveSeverity::Low,
            "medium" => CveSeverity::Medium,
            "high" => CveSeverity::High,
            "critical" => CveSeverity::Critical,
            _ => CveSeverity::Unknown,
        })
    }
}

/// A known vulnerability affecting an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CveResult {
    pub cve_id: String,
    pub package_name: String,
    pub installed_version: String,
    /// Empty when no fixed version has been published yet.
    pub fixed_version: String,
    pub severity: CveSeverity,
    pub description: String,
    pub url: String,
}
