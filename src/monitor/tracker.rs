//! Per-session alert state for idle-in-transaction sessions.

use std::collections::{HashMap, HashSet};

use crate::fmt::truncate_query;
use crate::pg::Session;

/// Alert progression for one tracked session. Moves forward only:
/// a session that already alerted at critical never re-alerts at any
/// severity, no matter how its idle time develops afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertStage {
    New,
    WarningSent,
    CriticalSent,
}

/// One idle-in-transaction session under observation.
#[derive(Clone, Debug)]
pub struct TrackedSession {
    pub pid: i32,
    pub application: String,
    /// Query text captured at first observation, normalized and bounded.
    pub query: String,
    /// Epoch seconds of the first observation.
    pub first_seen: i64,
    pub stage: AlertStage,
}

/// Threshold crossings produced by a single observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transitions {
    pub warning: bool,
    pub critical: bool,
}

/// A session that left the idle-in-transaction state (or disappeared).
#[derive(Clone, Debug)]
pub struct ResolvedSession {
    pub pid: i32,
    pub application: String,
    /// Seconds between first observation and resolution.
    pub total_secs: i64,
    /// True when at least one alert fired for this session, meaning a
    /// resolution notice is owed to whoever saw the alert.
    pub alerted: bool,
}

/// Table of idle-in-transaction sessions keyed by PID.
///
/// Each severity fires at most once per tracked session. A session whose
/// idle time jumps past both thresholds between two polls produces both
/// transitions in the same observation, so the warning is never silently
/// skipped on the way to critical.
#[derive(Debug, Default)]
pub struct IdleTracker {
    sessions: HashMap<i32, TrackedSession>,
}

impl IdleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently tracked.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.sessions.contains_key(&pid)
    }

    pub fn get(&self, pid: i32) -> Option<&TrackedSession> {
        self.sessions.get(&pid)
    }

    /// Records one observation of an idle session, registering it on
    /// first sight, and reports which thresholds were newly crossed.
    ///
    /// `now` is the observation time in epoch seconds; identity fields
    /// are captured at first sight and not refreshed on later polls.
    pub fn observe(
        &mut self,
        session: &Session,
        idle_secs: i64,
        warning_secs: i64,
        critical_secs: i64,
        now: i64,
    ) -> Transitions {
        let entry = self
            .sessions
            .entry(session.pid)
            .or_insert_with(|| TrackedSession {
                pid: session.pid,
                application: session.application_name.clone(),
                query: truncate_query(&session.query, 100),
                first_seen: now,
                stage: AlertStage::New,
            });

        let mut transitions = Transitions::default();
        if entry.stage == AlertStage::New && idle_secs >= warning_secs {
            transitions.warning = true;
            entry.stage = AlertStage::WarningSent;
        }
        if entry.stage != AlertStage::CriticalSent && idle_secs >= critical_secs {
            transitions.critical = true;
            entry.stage = AlertStage::CriticalSent;
        }
        transitions
    }

    /// Drops every tracked session absent from `seen` and reports each
    /// one. `seen` is rebuilt from the current snapshot every cycle; the
    /// tracker never carries it over.
    pub fn reconcile(&mut self, seen: &HashSet<i32>, now: i64) -> Vec<ResolvedSession> {
        let gone: Vec<i32> = self
            .sessions
            .keys()
            .filter(|pid| !seen.contains(pid))
            .copied()
            .collect();

        let mut resolved = Vec::with_capacity(gone.len());
        for pid in gone {
            if let Some(tracked) = self.sessions.remove(&pid) {
                resolved.push(ResolvedSession {
                    pid,
                    application: tracked.application,
                    total_secs: (now - tracked.first_seen).max(0),
                    alerted: tracked.stage != AlertStage::New,
                });
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::SessionState;

    const WARN: i64 = 30;
    const CRIT: i64 = 120;

    fn idle_session(pid: i32) -> Session {
        Session {
            pid,
            username: "app".to_string(),
            application_name: "payment-api".to_string(),
            client_addr: "10.0.0.5".to_string(),
            state: SessionState::IdleInTransaction,
            state_change: 0,
            xact_start: 0,
            query: "UPDATE accounts SET balance = balance + 100".to_string(),
            collected_at: 0,
        }
    }

    fn seen(pids: &[i32]) -> HashSet<i32> {
        pids.iter().copied().collect()
    }

    #[test]
    fn test_warning_fires_once() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1001);

        let t = tracker.observe(&s, 45, WARN, CRIT, 1000);
        assert_eq!(t, Transitions { warning: true, critical: false });

        let t = tracker.observe(&s, 50, WARN, CRIT, 1005);
        assert_eq!(t, Transitions::default());
    }

    #[test]
    fn test_critical_fires_once_after_warning() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1001);

        tracker.observe(&s, 45, WARN, CRIT, 1000);
        let t = tracker.observe(&s, 135, WARN, CRIT, 1090);
        assert_eq!(t, Transitions { warning: false, critical: true });

        let t = tracker.observe(&s, 200, WARN, CRIT, 1155);
        assert_eq!(t, Transitions::default());
    }

    #[test]
    fn test_both_thresholds_in_one_observation() {
        // first sighting already past critical: both alerts are owed
        let mut tracker = IdleTracker::new();
        let s = idle_session(1001);

        let t = tracker.observe(&s, 150, WARN, CRIT, 1000);
        assert_eq!(t, Transitions { warning: true, critical: true });
        assert_eq!(tracker.get(1001).unwrap().stage, AlertStage::CriticalSent);
    }

    #[test]
    fn test_below_warning_tracks_silently() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1001);

        let t = tracker.observe(&s, 10, WARN, CRIT, 1000);
        assert_eq!(t, Transitions::default());
        assert!(tracker.contains(1001));
        assert_eq!(tracker.get(1001).unwrap().stage, AlertStage::New);
    }

    #[test]
    fn test_identity_captured_at_first_sight() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1001);
        tracker.observe(&s, 10, WARN, CRIT, 1000);

        let mut renamed = idle_session(1001);
        renamed.application_name = "other".to_string();
        tracker.observe(&renamed, 20, WARN, CRIT, 1010);

        let tracked = tracker.get(1001).unwrap();
        assert_eq!(tracked.application, "payment-api");
        assert_eq!(tracked.first_seen, 1000);
    }

    #[test]
    fn test_reconcile_reports_alerted_session() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1002);
        tracker.observe(&s, 45, WARN, CRIT, 1000);
        tracker.observe(&s, 135, WARN, CRIT, 1090);

        let resolved = tracker.reconcile(&seen(&[]), 1210);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].pid, 1002);
        assert_eq!(resolved[0].application, "payment-api");
        assert_eq!(resolved[0].total_secs, 210);
        assert!(resolved[0].alerted);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_reconcile_silent_session_not_alerted() {
        let mut tracker = IdleTracker::new();
        let s = idle_session(1003);
        tracker.observe(&s, 5, WARN, CRIT, 1000);

        let resolved = tracker.reconcile(&seen(&[]), 1020);
        assert_eq!(resolved.len(), 1);
        assert!(!resolved[0].alerted);
    }

    #[test]
    fn test_reconcile_keeps_seen_sessions() {
        let mut tracker = IdleTracker::new();
        tracker.observe(&idle_session(1), 45, WARN, CRIT, 1000);
        tracker.observe(&idle_session(2), 45, WARN, CRIT, 1000);

        let resolved = tracker.reconcile(&seen(&[1]), 1050);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].pid, 2);
        assert!(tracker.contains(1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_tracked_query_is_normalized_and_bounded() {
        let mut tracker = IdleTracker::new();
        let mut s = idle_session(7);
        s.query = format!("SELECT *\n  FROM {}", "x".repeat(200));
        tracker.observe(&s, 5, WARN, CRIT, 1000);

        let q = &tracker.get(7).unwrap().query;
        assert!(q.starts_with("SELECT * FROM"));
        assert!(q.chars().count() <= 100);
        assert!(q.ends_with("..."));
    }
}
