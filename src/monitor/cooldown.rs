//! Rate limiting for recurring pool alerts.

use std::time::{Duration, Instant};

use crate::monitor::thresholds::Severity;

/// Per-severity cooldown gate for pool pressure alerts.
///
/// Pool alerts are condition-based rather than one-shot: while the pool
/// stays above a threshold the daemon keeps re-raising the alert, and the
/// gate spaces repeats at least one cooldown apart. Warning and critical
/// timers run independently, so an escalation to critical is never
/// silenced by a recent warning.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_warning: Option<Instant>,
    last_critical: Option<Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an alert of `severity` may fire now, and if so record
    /// the send time. A denied check leaves the stored timestamp untouched,
    /// so suppressed attempts do not push the next allowed send further out.
    pub fn check_and_set(&mut self, severity: Severity, cooldown: Duration) -> bool {
        self.check_at(severity, cooldown, Instant::now())
    }

    fn check_at(&mut self, severity: Severity, cooldown: Duration, now: Instant) -> bool {
        let slot = match severity {
            Severity::Warning => &mut self.last_warning,
            Severity::Critical => &mut self.last_critical,
            Severity::None => return false,
        };
        match slot {
            Some(last) if now.duration_since(*last) < cooldown => false,
            _ => {
                *slot = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(300);

    #[test]
    fn test_first_alert_always_allowed() {
        let mut gate = CooldownGate::new();
        assert!(gate.check_at(Severity::Warning, COOLDOWN, Instant::now()));
    }

    #[test]
    fn test_suppressed_within_cooldown() {
        let t0 = Instant::now();
        let mut gate = CooldownGate::new();
        assert!(gate.check_at(Severity::Warning, COOLDOWN, t0));
        assert!(!gate.check_at(Severity::Warning, COOLDOWN, t0 + Duration::from_secs(1)));
        assert!(!gate.check_at(Severity::Warning, COOLDOWN, t0 + Duration::from_secs(299)));
    }

    #[test]
    fn test_allowed_again_at_cooldown_boundary() {
        let t0 = Instant::now();
        let mut gate = CooldownGate::new();
        assert!(gate.check_at(Severity::Critical, COOLDOWN, t0));
        assert!(gate.check_at(Severity::Critical, COOLDOWN, t0 + COOLDOWN));
    }

    #[test]
    fn test_denied_check_does_not_reset_timer() {
        let t0 = Instant::now();
        let mut gate = CooldownGate::new();
        assert!(gate.check_at(Severity::Warning, COOLDOWN, t0));
        // a denied attempt mid-window must not delay the next send
        assert!(!gate.check_at(Severity::Warning, COOLDOWN, t0 + Duration::from_secs(200)));
        assert!(gate.check_at(Severity::Warning, COOLDOWN, t0 + Duration::from_secs(300)));
    }

    #[test]
    fn test_severities_tracked_independently() {
        let t0 = Instant::now();
        let mut gate = CooldownGate::new();
        assert!(gate.check_at(Severity::Warning, COOLDOWN, t0));
        // critical has its own timer, unaffected by the warning just sent
        assert!(gate.check_at(Severity::Critical, COOLDOWN, t0 + Duration::from_secs(1)));
        assert!(!gate.check_at(Severity::Warning, COOLDOWN, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_none_severity_never_fires() {
        let mut gate = CooldownGate::new();
        assert!(!gate.check_at(Severity::None, COOLDOWN, Instant::now()));
    }
}
