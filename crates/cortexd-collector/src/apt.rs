use crate::run_command;
use chrono::{DateTime, Utc};
use cortexd_common::types::PackageUpdate;
use std::sync::Mutex;

/// Pending package updates from `apt list --upgradable`.
///
/// The check spawns a subprocess and is slow, so results are cached and
/// the monitor only refreshes every few cycles. All accessors read the
/// cache.
pub struct AptCollector {
    state: Mutex<AptState>,
}

#[derive(Default)]
struct AptState {
    cached: Vec<PackageUpdate>,
    last_check: Option<DateTime<Utc>>,
}

impl AptCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AptState::default()),
        }
    }

    /// Run the apt query and refresh the cache.
    pub fn check_updates(&self) -> Vec<PackageUpdate> {
        let output = match run_command("apt", &["list", "--upgradable"]) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "apt query failed");
                return Vec::new();
            }
        };

        let updates = parse_apt_output(&output);
        let security = updates.iter().filter(|u| u.is_security).count();
        tracing::info!(
            pending = updates.len(),
            security,
            "Package update check complete"
        );

        let mut state = self.lock_state();
        state.cached = updates.clone();
        state.last_check = Some(Utc::now());
        updates
    }

    pub fn cached_updates(&self) -> Vec<PackageUpdate> {
        self.lock_state().cached.clone()
    }

    pub fn pending_count(&self) -> u64 {
        self.lock_state().cached.len() as u64
    }

    pub fn security_count(&self) -> u64 {
        self.lock_state()
            .cached
            .iter()
            .filter(|u| u.is_security)
            .count() as u64
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_check
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AptCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `apt list --upgradable` output lines of the form:
///
/// `vim/focal-updates 2:8.2.123-1ubuntu1 amd64 [upgradable from: 2:8.2.100-1]`
pub fn parse_apt_output(output: &str) -> Vec<PackageUpdate> {
    let mut updates = Vec::new();

    for line in output.lines() {
        if line.starts_with("Listing") || line.trim().is_empty() {
            continue;
        }

        let Some((name, rest)) = line.split_once('/') else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let (Some(source), Some(available_version)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some(current_version) = line
            .split_once("[upgradable from:")
            .map(|(_, v)| v.trim_end_matches(']').trim())
        else {
            continue;
        };
        if current_version.is_empty() {
            continue;
        }

        updates.push(PackageUpdate {
            name: name.to_string(),
            current_version: current_version.to_string(),
            available_version: available_version.to_string(),
            source: source.to_string(),
            is_security: source.contains("security"),
        });
    }

    updates
}
