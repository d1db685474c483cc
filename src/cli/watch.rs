//! Line-oriented live view of idle transactions and pool pressure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;

use crate::config::Config;
use crate::fmt::{format_duration, truncate_query};
use crate::monitor::{IdleTracker, Severity, classify};
use crate::pg::PgClient;

/// Event markers, one per line: [!] warning, [X] critical, [+] resolved,
/// [E] error.
fn log_event(prefix: &str, message: &str) {
    println!("{} {} {}", Local::now().format("%H:%M:%S"), prefix, message);
}

pub fn run(
    cfg: &Config,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = PgClient::new(&cfg.connection_string(), cfg.polling.timeout)?;

    let warning_secs = cfg.thresholds.idle_transaction.warning.as_secs() as i64;
    let critical_secs = cfg.thresholds.idle_transaction.critical.as_secs() as i64;

    println!("Watching PostgreSQL connections... (Ctrl+C to stop)");
    println!(
        "Refresh: {}s | Thresholds: warn={}, crit={}",
        interval.as_secs(),
        format_duration(warning_secs),
        format_duration(critical_secs),
    );
    println!();

    let mut tracker = IdleTracker::new();

    while running.load(Ordering::SeqCst) {
        if let Err(e) = poll_once(cfg, &mut client, &mut tracker, warning_secs, critical_secs) {
            log_event("[E]", &e.to_string());
        }

        let step = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep = remaining.min(step);
            std::thread::sleep(sleep);
            remaining = remaining.saturating_sub(sleep);
        }
    }

    println!("\nStopping...");
    Ok(())
}

fn poll_once(
    cfg: &Config,
    client: &mut PgClient,
    tracker: &mut IdleTracker,
    warning_secs: i64,
    critical_secs: i64,
) -> Result<(), crate::pg::PgError> {
    let stats = client.pool_stats()?;
    let sessions = client.idle_transactions()?;
    let now = chrono::Utc::now().timestamp();

    let mut seen = std::collections::HashSet::with_capacity(sessions.len());
    for session in &sessions {
        seen.insert(session.pid);
        let idle_secs = session.idle_secs();
        let first_sight = !tracker.contains(session.pid);
        let transitions = tracker.observe(session, idle_secs, warning_secs, critical_secs, now);

        if transitions.warning {
            if first_sight {
                log_event(
                    "[!]",
                    &format!(
                        "New idle transaction: PID {} ({}) idle for {}",
                        session.pid,
                        session.application_name,
                        format_duration(idle_secs)
                    ),
                );
                log_event(
                    "   ",
                    &format!("Query: {}", truncate_query(&session.query, 60)),
                );
            } else {
                log_event(
                    "[!]",
                    &format!(
                        "PID {} ({}) idle for {}",
                        session.pid,
                        session.application_name,
                        format_duration(idle_secs)
                    ),
                );
            }
        }
        if transitions.critical {
            log_event(
                "[X]",
                &format!(
                    "PID {} ({}) idle for {}",
                    session.pid,
                    session.application_name,
                    format_duration(idle_secs)
                ),
            );
        }
    }

    for resolved in tracker.reconcile(&seen, now) {
        log_event(
            "[+]",
            &format!(
                "Resolved: PID {} ({}) - was idle for {}",
                resolved.pid,
                resolved.application,
                format_duration(resolved.total_secs)
            ),
        );
    }

    let usage = stats.usage_percent();
    match classify(
        usage,
        f64::from(cfg.thresholds.connection_pool.warning_percent),
        f64::from(cfg.thresholds.connection_pool.critical_percent),
    ) {
        Severity::Critical => log_event(
            "[X]",
            &format!(
                "Connection pressure: {}/{} ({:.0}%) - approaching limit!",
                stats.total,
                stats.max_available(),
                usage
            ),
        ),
        Severity::Warning => log_event(
            "[!]",
            &format!(
                "Connection pressure: {}/{} ({:.0}%)",
                stats.total,
                stats.max_available(),
                usage
            ),
        ),
        Severity::None => {}
    }

    Ok(())
}
