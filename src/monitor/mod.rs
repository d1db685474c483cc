//! The poll-evaluate-act loop.
//!
//! [`Monitor`] owns all alerting state (tracked sessions, pool alert
//! cooldowns) and is its sole mutator. Cycles are strictly serialized:
//! one runs at a time, on a fixed interval, and a slow cycle delays the
//! next tick rather than overlapping it.

pub mod cooldown;
pub mod terminate;
pub mod thresholds;
pub mod tracker;

pub use cooldown::CooldownGate;
pub use terminate::{ProtectedApp, TerminatePolicy};
pub use thresholds::{Severity, classify};
pub use tracker::IdleTracker;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEvent, AlertSeverity, Dispatcher};
use crate::config::Config;
use crate::fmt::format_duration;
use crate::pg::{PgClient, PgError, PoolStats, Session};

/// What the monitor needs from the database each cycle. `PgClient` is
/// the live implementation; tests substitute a scripted one.
pub trait SnapshotSource {
    fn pool_stats(&mut self) -> Result<PoolStats, PgError>;
    fn idle_sessions(&mut self) -> Result<Vec<Session>, PgError>;
    fn terminate(&mut self, pid: i32) -> Result<bool, PgError>;
}

impl SnapshotSource for PgClient {
    fn pool_stats(&mut self) -> Result<PoolStats, PgError> {
        self.pool_stats()
    }

    fn idle_sessions(&mut self) -> Result<Vec<Session>, PgError> {
        self.idle_transactions()
    }

    fn terminate(&mut self, pid: i32) -> Result<bool, PgError> {
        self.terminate_backend(pid)
    }
}

/// Auto-terminate settings for the driver. The policy handles per-app
/// exceptions; the fields here are the global gates around it.
#[derive(Clone, Debug, Default)]
pub struct AutoTerminate {
    pub enabled: bool,
    pub dry_run: bool,
    pub after_secs: i64,
    pub policy: TerminatePolicy,
}

/// Threshold and pacing settings the driver evaluates against.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub idle_warning_secs: i64,
    pub idle_critical_secs: i64,
    pub pool_warning_percent: f64,
    pub pool_critical_percent: f64,
    pub interval: Duration,
    pub cooldown: Duration,
    pub auto_terminate: AutoTerminate,
}

impl MonitorConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            idle_warning_secs: cfg.thresholds.idle_transaction.warning.as_secs() as i64,
            idle_critical_secs: cfg.thresholds.idle_transaction.critical.as_secs() as i64,
            pool_warning_percent: f64::from(cfg.thresholds.connection_pool.warning_percent),
            pool_critical_percent: f64::from(cfg.thresholds.connection_pool.critical_percent),
            interval: cfg.polling.interval,
            cooldown: cfg.alerts.cooldown,
            auto_terminate: AutoTerminate {
                enabled: cfg.auto_terminate.enabled,
                dry_run: cfg.auto_terminate.dry_run,
                after_secs: cfg.auto_terminate.after.as_secs() as i64,
                policy: TerminatePolicy {
                    exclude_apps: cfg.auto_terminate.exclude_apps.clone(),
                    exclude_ips: cfg.auto_terminate.exclude_ips.clone(),
                    protected_apps: cfg
                        .auto_terminate
                        .protected_apps
                        .iter()
                        .map(|p| ProtectedApp {
                            name: p.name.clone(),
                            min_idle_secs: p.min_idle_duration.as_secs() as i64,
                            require_confirmation: p.require_confirmation,
                        })
                        .collect(),
                },
            },
        }
    }
}

/// The poll cycle driver.
pub struct Monitor<S: SnapshotSource> {
    config: MonitorConfig,
    source: S,
    dispatcher: Dispatcher,
    tracker: IdleTracker,
    cooldown: CooldownGate,
    cycles: u64,
    failed_cycles: u64,
}

impl<S: SnapshotSource> Monitor<S> {
    pub fn new(config: MonitorConfig, source: S, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            source,
            dispatcher,
            tracker: IdleTracker::new(),
            cooldown: CooldownGate::new(),
            cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn tracked_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Runs cycles until `running` flips to false. The inter-cycle sleep
    /// checks the flag every 100ms so shutdown does not wait out a long
    /// interval.
    pub fn run(&mut self, running: &Arc<AtomicBool>) {
        info!("starting monitoring loop");
        while running.load(Ordering::SeqCst) {
            self.run_cycle();

            let step = Duration::from_millis(100);
            let mut remaining = self.config.interval;
            while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
                let sleep = remaining.min(step);
                std::thread::sleep(sleep);
                remaining = remaining.saturating_sub(sleep);
            }
        }
        info!(
            cycles = self.cycles,
            failed = self.failed_cycles,
            tracked = self.tracker.len(),
            "monitoring loop stopped"
        );
    }

    /// One full cycle including dispatch. A fetch failure is logged and
    /// counted; the loop carries on at the next tick.
    pub fn run_cycle(&mut self) {
        self.cycles += 1;
        match self.cycle_at(Utc::now().timestamp()) {
            Ok(events) => {
                for event in &events {
                    self.dispatcher.dispatch(event);
                }
            }
            Err(e) => {
                self.failed_cycles += 1;
                error!("polling failed: {}", e);
            }
        }
    }

    /// Fetch, evaluate, and collect the cycle's alert events in dispatch
    /// order: pool pressure, session threshold crossings, terminations,
    /// resolutions. Both fetches happen before any evaluation, so a
    /// failed cycle mutates nothing.
    fn cycle_at(&mut self, now: i64) -> Result<Vec<AlertEvent>, PgError> {
        let stats = self.source.pool_stats()?;
        let sessions = self.source.idle_sessions()?;

        let mut events = Vec::new();
        self.evaluate_pool(&stats, &mut events);

        let mut seen = HashSet::with_capacity(sessions.len());
        for session in &sessions {
            seen.insert(session.pid);
            self.evaluate_session(session, now, &mut events);
        }

        if self.config.auto_terminate.enabled {
            for session in &sessions {
                self.evaluate_termination(session, &mut events);
            }
        }

        for resolved in self.tracker.reconcile(&seen, now) {
            info!(
                pid = resolved.pid,
                app = %resolved.application,
                duration = %format_duration(resolved.total_secs),
                "idle transaction resolved"
            );
            if resolved.alerted {
                events.push(AlertEvent::SessionResolved {
                    pid: resolved.pid,
                    application: resolved.application,
                    total_secs: resolved.total_secs,
                });
            }
        }

        debug!(
            tracked = self.tracker.len(),
            idle_in_transaction = sessions.len(),
            pool_usage = %format!("{:.1}%", stats.usage_percent()),
            "cycle complete"
        );
        Ok(events)
    }

    fn evaluate_pool(&mut self, stats: &PoolStats, events: &mut Vec<AlertEvent>) {
        let usage = stats.usage_percent();
        let severity = classify(
            usage,
            self.config.pool_warning_percent,
            self.config.pool_critical_percent,
        );
        let alert_severity = match severity {
            Severity::None => return,
            Severity::Warning => {
                warn!(
                    usage_percent = %format!("{:.1}", usage),
                    used = stats.total,
                    max = stats.max_available(),
                    "connection pool warning"
                );
                AlertSeverity::Warning
            }
            Severity::Critical => {
                error!(
                    usage_percent = %format!("{:.1}", usage),
                    used = stats.total,
                    max = stats.max_available(),
                    "connection pool critical"
                );
                AlertSeverity::Critical
            }
        };

        // pool pressure is recurring: re-alert once per cooldown window
        if self.cooldown.check_and_set(severity, self.config.cooldown) {
            events.push(AlertEvent::PoolPressure {
                severity: alert_severity,
                used: stats.total,
                max_available: stats.max_available(),
                usage_percent: usage,
            });
        }
    }

    fn evaluate_session(&mut self, session: &Session, now: i64, events: &mut Vec<AlertEvent>) {
        let idle_secs = session.idle_secs();
        let transitions = self.tracker.observe(
            session,
            idle_secs,
            self.config.idle_warning_secs,
            self.config.idle_critical_secs,
            now,
        );

        if transitions.warning {
            warn!(
                pid = session.pid,
                app = %session.application_name,
                duration = %format_duration(idle_secs),
                "idle transaction detected"
            );
            events.push(AlertEvent::SessionIdle {
                severity: AlertSeverity::Warning,
                pid: session.pid,
                application: session.application_name.clone(),
                idle_secs,
                query: session.query.clone(),
            });
        }
        if transitions.critical {
            error!(
                pid = session.pid,
                app = %session.application_name,
                duration = %format_duration(idle_secs),
                "idle transaction critical"
            );
            events.push(AlertEvent::SessionIdle {
                severity: AlertSeverity::Critical,
                pid: session.pid,
                application: session.application_name.clone(),
                idle_secs,
                query: session.query.clone(),
            });
        }
    }

    fn evaluate_termination(&mut self, session: &Session, events: &mut Vec<AlertEvent>) {
        let idle_secs = session.idle_secs();
        let auto = &self.config.auto_terminate;
        if idle_secs < auto.after_secs || !auto.policy.eligible(session, idle_secs) {
            return;
        }

        if auto.dry_run {
            info!(
                pid = session.pid,
                app = %session.application_name,
                duration = %format_duration(idle_secs),
                "dry-run: would terminate"
            );
            return;
        }

        warn!(
            pid = session.pid,
            app = %session.application_name,
            duration = %format_duration(idle_secs),
            "auto-terminating session"
        );
        match self.source.terminate(session.pid) {
            Ok(true) => events.push(AlertEvent::SessionTerminated {
                pid: session.pid,
                application: session.application_name.clone(),
                idle_secs,
                reason: "auto-terminate threshold exceeded".to_string(),
            }),
            // the session may be retried next cycle if still eligible
            Ok(false) => warn!(pid = session.pid, "backend already gone"),
            Err(e) => error!(pid = session.pid, "failed to terminate backend: {}", e),
        }
    }
}
