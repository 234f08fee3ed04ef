use crate::{command_exists, run_command};
use chrono::{DateTime, Utc};
use cortexd_common::types::{CveResult, CveSeverity};
use std::sync::Mutex;

/// CVE exposure scanner backed by the distribution's security tooling.
///
/// Prefers `ubuntu-security-status --format json` and falls back to
/// `debsecan`. A full scan spawns subprocesses and may take seconds;
/// results are cached with the scan time.
pub struct CveCollector {
    state: Mutex<CveState>,
}

#[derive(Default)]
struct CveState {
    cached: Vec<CveResult>,
    last_scan: Option<DateTime<Utc>>,
}

impl CveCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CveState::default()),
        }
    }

    /// Run a full scan and refresh the cache. Returns an empty list when
    /// no scanner tool is installed.
    pub fn scan(&self) -> Vec<CveResult> {
        let results = if command_exists("ubuntu-security-status") {
            match run_command("ubuntu-security-status", &["--format", "json"]) {
                Ok(output) => parse_ubuntu_security_json(&output),
                Err(e) => {
                    tracing::error!(error = %e, "ubuntu-security-status failed");
                    Vec::new()
                }
            }
        } else if command_exists("debsecan") {
            match run_command("debsecan", &[]) {
                Ok(output) => parse_debsecan_output(&output),
                Err(e) => {
                    tracing::error!(error = %e, "debsecan failed");
                    Vec::new()
                }
            }
        } else {
            tracing::debug!("No CVE scanner tool available");
            Vec::new()
        };

        tracing::info!(vulnerabilities = results.len(), "CVE scan complete");

        let mut state = self.lock_state();
        state.cached = results.clone();
        state.last_scan = Some(Utc::now());
        results
    }

    pub fn cached_results(&self) -> Vec<CveResult> {
        self.lock_state().cached.clone()
    }

    pub fn has_vulnerabilities(&self) -> bool {
        !self.lock_state().cached.is_empty()
    }

    pub fn count_by_severity(&self, severity: CveSeverity) -> u64 {
        self.lock_state()
            .cached
            .iter()
            .filter(|r| r.severity == severity)
            .count() as u64
    }

    pub fn check_package(&self, package_name: &str) -> Option<CveResult> {
        self.lock_state()
            .cached
            .iter()
            .find(|r| r.package_name == package_name)
            .cloned()
    }

    pub fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_scan
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CveCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the JSON report of `ubuntu-security-status --format json`,
/// tolerating missing fields.
pub fn parse_ubuntu_security_json(output: &str) -> Vec<CveResult> {
    let doc: serde_json::Value = match serde_json::from_str(output) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(error = %e, "Cannot parse ubuntu-security-status output");
            return Vec::new();
        }
    };

    let Some(cves) = doc.get("cves").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let str_field = |item: &serde_json::Value, key: &str| -> String {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    cves.iter()
        .filter_map(|item| {
            let cve_id = str_field(item, "cve");
            if cve_id.is_empty() {
                return None;
            }
            let severity = str_field(item, "priority")
                .parse()
                .unwrap_or(CveSeverity::Unknown);
            Some(CveResult {
                cve_id,
                package_name: str_field(item, "package"),
                installed_version: str_field(item, "installed_version"),
                fixed_version: str_field(item, "fixed_version"),
                severity,
                description: str_field(item, "description"),
                url: str_field(item, "url"),
            })
        })
        .collect()
}

/// Parse debsecan's line output:
///
/// `CVE-2024-1234 openssl (remotely exploitable, high urgency)`
pub fn parse_debsecan_output(output: &str) -> Vec<CveResult> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let cve_id = fields.next()?;
            if !cve_id.starts_with("CVE-") {
                return None;
            }
            let package_name = fields.next()?.to_string();

            let flags = line
                .split_once('(')
                .map(|(_, rest)| rest.trim_end_matches(')'))
                .unwrap_or("");
            let severity = flags
                .split(',')
                .map(str::trim)
                .find_map(|flag| flag.strip_suffix(" urgency"))
                .map(|urgency| urgency.parse().unwrap_or(CveSeverity::Unknown))
                .unwrap_or(CveSeverity::Unknown);

            Some(CveResult {
                cve_id: cve_id.to_string(),
                package_name,
                installed_version: String::new(),
                fixed_version: String::new(),
                severity,
                description: String::new(),
                url: format!("https://security-tracker.debian.org/tracker/{cve_id}"),
            })
        })
        .collect()
}
