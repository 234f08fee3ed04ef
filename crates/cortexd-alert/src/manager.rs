use chrono::{DateTime, Duration, Utc};
use cortexd_common::types::{Alert, AlertType, Severity};
use cortexd_storage::AlertStore;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked after an alert is persisted, in registration order.
pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

const DEFAULT_DEDUP_WINDOW_SECS: i64 = 300;
const DEFAULT_RETENTION_HOURS: i64 = 168;

/// Thread-safe alert manager wrapping an [`AlertStore`].
///
/// A created alert is persisted before its id is returned; duplicates
/// raised within the dedup window are suppressed and reported as an empty
/// id.
pub struct AlertManager {
    store: AlertStore,
    callbacks: Mutex<Vec<AlertCallback>>,
    recent: Mutex<HashMap<String, DateTime<Utc>>>,
    dedup_window: Duration,
}

impl AlertManager {
    pub fn new(store: AlertStore) -> Self {
        Self::with_dedup_window(store, Duration::seconds(DEFAULT_DEDUP_WINDOW_SECS))
    }

    pub fn with_dedup_window(store: AlertStore, dedup_window: Duration) -> Self {
        Self {
            store,
            callbacks: Mutex::new(Vec::new()),
            recent: Mutex::new(HashMap::new()),
            dedup_window,
        }
    }

    /// Create and persist a new alert.
    ///
    /// Returns the generated id, or an empty string when the alert was
    /// suppressed as a duplicate or the store rejected it.
    pub fn create(
        &self,
        severity: Severity,
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> String {
        let alert = Alert::new(severity, alert_type, title, message, metadata);

        if self.is_duplicate(&alert) {
            tracing::debug!(
                alert_type = %alert.alert_type,
                title = %alert.title,
                "Alert suppressed (dedup window)"
            );
            return String::new();
        }

        if !self.store.insert(&alert) {
            return String::new();
        }

        tracing::info!(
            id = %alert.id,
            severity = %alert.severity,
            alert_type = %alert.alert_type,
            title = %alert.title,
            "Alert created"
        );

        self.notify_callbacks(&alert);
        alert.id
    }

    /// Mark an alert acknowledged. Re-acknowledging succeeds without
    /// changing the original acknowledgement time.
    pub fn acknowledge(&self, id: &str) -> bool {
        let Some(mut alert) = self.store.get(id) else {
            return false;
        };
        if alert.acknowledged {
            return true;
        }
        alert.acknowledged = true;
        alert.acknowledged_at = Some(Utc::now());
        self.store.update(&alert)
    }

    /// Mark an alert resolved. A resolved alert never becomes active
    /// again.
    pub fn resolve(&self, id: &str, resolution: &str) -> bool {
        let Some(mut alert) = self.store.get(id) else {
            return false;
        };
        if alert.resolved {
            return true;
        }
        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        alert.resolution = resolution.to_string();
        self.store.update(&alert)
    }

    /// Delete an alert outright.
    pub fn dismiss(&self, id: &str) -> bool {
        self.store.remove(id)
    }

    /// Acknowledge every active alert; returns how many transitioned.
    pub fn acknowledge_all(&self) -> u64 {
        let now = Utc::now();
        let mut count = 0;
        for mut alert in self.store.get_active() {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(now);
            if self.store.update(&alert) {
                count += 1;
            }
        }
        count
    }

    /// Delete resolved alerts older than `max_age`; returns how many were
    /// removed. The default retention is 168 hours.
    pub fn cleanup_old(&self, max_age: Duration) -> u64 {
        self.store.cleanup_before(Utc::now() - max_age)
    }

    pub fn default_retention() -> Duration {
        Duration::hours(DEFAULT_RETENTION_HOURS)
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.store.get(id)
    }

    pub fn get_all(&self, limit: u64) -> Vec<Alert> {
        self.store.get_all(limit)
    }

    pub fn get_active(&self) -> Vec<Alert> {
        self.store.get_active()
    }

    pub fn get_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.store.get_by_severity(severity)
    }

    pub fn get_by_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.store.get_by_type(alert_type)
    }

    pub fn count_active(&self) -> u64 {
        self.store.count_active()
    }

    pub fn count_by_severity(&self, severity: Severity) -> u64 {
        self.store.count_by_severity(severity)
    }

    /// Register a callback invoked synchronously after each successful
    /// insert.
    pub fn on_alert(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.lock(&self.callbacks).push(Arc::new(callback));
    }

    /// Complete dump of the alert table as structured data.
    pub fn export_json(&self) -> serde_json::Value {
        let alerts: Vec<serde_json::Value> = self
            .store
            .get_all(u64::MAX)
            .iter()
            .map(Alert::to_json)
            .collect();
        let count = alerts.len();
        json!({ "alerts": alerts, "count": count })
    }

    /// Dedup check: prune expired hashes, then record this alert's hash.
    /// Returns true when an identical alert was seen within the window.
    fn is_duplicate(&self, alert: &Alert) -> bool {
        let now = Utc::now();
        let hash = alert_hash(alert);

        let mut recent = self.lock(&self.recent);
        recent.retain(|_, seen| now - *seen < self.dedup_window);

        if recent.contains_key(&hash) {
            return true;
        }
        recent.insert(hash, now);
        false
    }

    /// Invoke callbacks outside every internal lock so a callback may call
    /// back into the manager.
    fn notify_callbacks(&self, alert: &Alert) {
        let callbacks: Vec<AlertCallback> = self.lock(&self.callbacks).clone();
        for callback in callbacks {
            callback(alert);
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Dedup key over everything that makes two alerts "the same event".
fn alert_hash(alert: &Alert) -> String {
    let mut hash = format!("{}|{}|{}", alert.alert_type, alert.title, alert.message);
    for (key, value) in &alert.metadata {
        hash.push('|');
        hash.push_str(key);
        hash.push('=');
        hash.push_str(value);
    }
    hash
}
