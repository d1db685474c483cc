//! Auto-terminate eligibility policy.

use tracing::{debug, info};

use crate::pg::Session;

/// App-level override: a protected app either gets its own idle threshold
/// or is exempt from automatic termination entirely.
#[derive(Clone, Debug)]
pub struct ProtectedApp {
    pub name: String,
    pub min_idle_secs: i64,
    pub require_confirmation: bool,
}

/// Decides which sessions may be terminated automatically. The caller is
/// responsible for the global gates (feature enabled, idle time past the
/// global `after` threshold); this policy applies the per-app and per-IP
/// exceptions.
#[derive(Clone, Debug, Default)]
pub struct TerminatePolicy {
    pub exclude_apps: Vec<String>,
    pub exclude_ips: Vec<String>,
    pub protected_apps: Vec<ProtectedApp>,
}

impl TerminatePolicy {
    /// First match wins: excluded app, excluded client address, protected
    /// app rules, then eligible by default.
    pub fn eligible(&self, session: &Session, idle_secs: i64) -> bool {
        if self
            .exclude_apps
            .iter()
            .any(|app| *app == session.application_name)
        {
            return false;
        }

        if self
            .exclude_ips
            .iter()
            .any(|ip| *ip == session.client_addr)
        {
            return false;
        }

        for protected in &self.protected_apps {
            if protected.name != session.application_name {
                continue;
            }
            if protected.require_confirmation {
                debug!(
                    pid = session.pid,
                    app = %session.application_name,
                    "skipping protected app requiring confirmation"
                );
                return false;
            }
            if idle_secs < protected.min_idle_secs {
                debug!(
                    pid = session.pid,
                    app = %session.application_name,
                    idle_secs,
                    threshold_secs = protected.min_idle_secs,
                    "protected app under threshold"
                );
                return false;
            }
            info!(
                pid = session.pid,
                app = %session.application_name,
                idle_secs,
                threshold_secs = protected.min_idle_secs,
                "protected app exceeded its own threshold"
            );
            return true;
        }

        true
    }
}
