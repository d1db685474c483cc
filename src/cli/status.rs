//! One-shot snapshot of pool and idle-transaction state.
//!
//! The exit code encodes the worst classification found (0/1/2 =
//! ok/warning/critical) so the command doubles as a health check.

use serde::Serialize;

use super::{EXIT_CRITICAL, EXIT_OK, EXIT_WARNING};
use crate::config::Config;
use crate::fmt::{format_duration, truncate, truncate_query};
use crate::monitor::{Severity, classify};
use crate::pg::{PgClient, PoolStats, Session};

#[derive(Debug, Serialize)]
struct StatusOutput {
    status: &'static str,
    pool: PoolStatus,
    idle_transactions: Vec<IdleTransactionStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    connections: Vec<ConnectionStatus>,
    thresholds: ThresholdStatus,
}

#[derive(Debug, Serialize)]
struct PoolStatus {
    max_connections: i64,
    total_connections: i64,
    active_connections: i64,
    idle_connections: i64,
    idle_in_transaction: i64,
    available_connections: i64,
    usage_percent: f64,
}

#[derive(Debug, Serialize)]
struct IdleTransactionStatus {
    pid: i32,
    application: String,
    duration: String,
    duration_seconds: i64,
    query: String,
    severity: &'static str,
}

#[derive(Debug, Serialize)]
struct ConnectionStatus {
    pid: i32,
    state: String,
    application: String,
    client_addr: String,
    duration: String,
}

#[derive(Debug, Serialize)]
struct ThresholdStatus {
    idle_warning: String,
    idle_critical: String,
    pool_warning_percent: u8,
    pool_critical_percent: u8,
}

pub fn run(
    cfg: &Config,
    verbose: bool,
    json: bool,
    quiet: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut client = PgClient::new(&cfg.connection_string(), cfg.polling.timeout)?;
    let stats = client.pool_stats()?;
    let sessions = client.sessions()?;
    let idle: Vec<&Session> = sessions.iter().filter(|s| s.is_idle_in_transaction()).collect();

    let overall = overall_severity(cfg, &stats, &idle);
    let exit_code = match overall {
        Severity::None => EXIT_OK,
        Severity::Warning => EXIT_WARNING,
        Severity::Critical => EXIT_CRITICAL,
    };

    if quiet {
        return Ok(exit_code);
    }

    if json {
        let output = build_output(cfg, &stats, &sessions, &idle, overall, verbose);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(exit_code);
    }

    print_human(cfg, &stats, &sessions, &idle, verbose);
    Ok(exit_code)
}

fn session_severity(cfg: &Config, session: &Session) -> Severity {
    classify(
        session.idle_secs(),
        cfg.thresholds.idle_transaction.warning.as_secs() as i64,
        cfg.thresholds.idle_transaction.critical.as_secs() as i64,
    )
}

fn pool_severity(cfg: &Config, stats: &PoolStats) -> Severity {
    classify(
        stats.usage_percent(),
        f64::from(cfg.thresholds.connection_pool.warning_percent),
        f64::from(cfg.thresholds.connection_pool.critical_percent),
    )
}

/// Worst of the pool classification and every idle session's.
fn overall_severity(cfg: &Config, stats: &PoolStats, idle: &[&Session]) -> Severity {
    idle.iter()
        .map(|s| session_severity(cfg, s))
        .fold(pool_severity(cfg, stats), Severity::max)
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::None => "",
        Severity::Warning => " [WARN]",
        Severity::Critical => " [CRIT]",
    }
}

fn build_output(
    cfg: &Config,
    stats: &PoolStats,
    sessions: &[Session],
    idle: &[&Session],
    overall: Severity,
    verbose: bool,
) -> StatusOutput {
    let status = match overall {
        Severity::None => "ok",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    };

    let idle_transactions = idle
        .iter()
        .map(|s| IdleTransactionStatus {
            pid: s.pid,
            application: s.application_name.clone(),
            duration: format_duration(s.idle_secs()),
            duration_seconds: s.idle_secs(),
            query: truncate_query(&s.query, 200),
            severity: match session_severity(cfg, s) {
                Severity::None => "",
                Severity::Warning => "warning",
                Severity::Critical => "critical",
            },
        })
        .collect();

    let connections = if verbose {
        sessions
            .iter()
            .map(|s| ConnectionStatus {
                pid: s.pid,
                state: s.state.to_string(),
                application: s.application_name.clone(),
                client_addr: s.client_addr.clone(),
                duration: format_duration(s.idle_secs()),
            })
            .collect()
    } else {
        Vec::new()
    };

    StatusOutput {
        status,
        pool: PoolStatus {
            max_connections: stats.max_connections,
            total_connections: stats.total,
            active_connections: stats.active,
            idle_connections: stats.idle,
            idle_in_transaction: stats.idle_in_transaction,
            available_connections: stats.available(),
            usage_percent: stats.usage_percent(),
        },
        idle_transactions,
        connections,
        thresholds: ThresholdStatus {
            idle_warning: format_duration(cfg.thresholds.idle_transaction.warning.as_secs() as i64),
            idle_critical: format_duration(
                cfg.thresholds.idle_transaction.critical.as_secs() as i64
            ),
            pool_warning_percent: cfg.thresholds.connection_pool.warning_percent,
            pool_critical_percent: cfg.thresholds.connection_pool.critical_percent,
        },
    }
}

fn print_human(
    cfg: &Config,
    stats: &PoolStats,
    sessions: &[Session],
    idle: &[&Session],
    verbose: bool,
) {
    println!();
    println!("Connection Pool (max: {})", stats.max_connections);
    println!("{}", "-".repeat(44));
    println!("Active:               {:3}", stats.active);
    println!("Idle:                 {:3}", stats.idle);
    let idle_marker = if stats.idle_in_transaction > 0 { "  [!]" } else { "" };
    println!("Idle in transaction:  {:3}{}", stats.idle_in_transaction, idle_marker);
    println!("Available:            {:3}", stats.available());

    println!(
        "\nUsage: {:.1}% ({}/{}){}",
        stats.usage_percent(),
        stats.total,
        stats.max_available(),
        severity_marker(pool_severity(cfg, stats))
    );

    if idle.is_empty() {
        println!("\nNo idle transactions.");
    } else {
        println!("\nIdle Transactions");
        println!("{}", "-".repeat(80));
        println!("{:<8} {:<10} {:<17} Query", "PID", "Age", "Application");
        for s in idle {
            println!(
                "{:<8} {:<10} {:<17} {}{}",
                s.pid,
                format_duration(s.idle_secs()),
                truncate(&s.application_name, 15),
                truncate_query(&s.query, 40),
                severity_marker(session_severity(cfg, s)),
            );
        }
    }

    if verbose && !sessions.is_empty() {
        println!("\nAll Connections");
        println!("{}", "-".repeat(80));
        println!("{:<8} {:<24} {:<17} {:<17} Age", "PID", "State", "Application", "Client");
        for s in sessions {
            println!(
                "{:<8} {:<24} {:<17} {:<17} {}",
                s.pid,
                s.state,
                truncate(&s.application_name, 15),
                s.client_addr,
                format_duration(s.idle_secs()),
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::SessionState;

    fn session(pid: i32, state: SessionState, idle_secs: i64) -> Session {
        Session {
            pid,
            username: "app".to_string(),
            application_name: "payment-api".to_string(),
            client_addr: "10.0.0.5".to_string(),
            state,
            state_change: 1_000_000 - idle_secs,
            xact_start: 0,
            query: "SELECT 1".to_string(),
            collected_at: 1_000_000,
        }
    }

    fn pool(total: i64) -> PoolStats {
        PoolStats {
            max_connections: 100,
            reserved_superuser: 3,
            total,
            active: 2,
            idle: 1,
            idle_in_transaction: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_overall_ok_when_quiet() {
        let cfg = Config::default();
        assert_eq!(overall_severity(&cfg, &pool(10), &[]), Severity::None);
    }

    #[test]
    fn test_overall_takes_worst_of_pool_and_sessions() {
        let cfg = Config::default();
        let warn_session = session(1, SessionState::IdleInTransaction, 45);
        let crit_session = session(2, SessionState::IdleInTransaction, 200);

        assert_eq!(
            overall_severity(&cfg, &pool(10), &[&warn_session]),
            Severity::Warning
        );
        assert_eq!(
            overall_severity(&cfg, &pool(10), &[&warn_session, &crit_session]),
            Severity::Critical
        );
        // pool critical dominates a merely-warning session
        assert_eq!(
            overall_severity(&cfg, &pool(95), &[&warn_session]),
            Severity::Critical
        );
    }

    #[test]
    fn test_json_output_shape() {
        let cfg = Config::default();
        let sessions = vec![session(1002, SessionState::IdleInTransaction, 135)];
        let idle: Vec<&Session> = sessions.iter().collect();
        let output = build_output(&cfg, &pool(10), &sessions, &idle, Severity::Critical, false);

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["status"], "critical");
        assert_eq!(value["pool"]["available_connections"], 87);
        assert_eq!(value["idle_transactions"][0]["pid"], 1002);
        assert_eq!(value["idle_transactions"][0]["severity"], "critical");
        assert_eq!(value["idle_transactions"][0]["duration"], "2m 15s");
        assert_eq!(value["thresholds"]["idle_warning"], "30s");
        // connections omitted unless verbose
        assert!(value.get("connections").is_none());
    }

    #[test]
    fn test_json_verbose_includes_all_connections() {
        let cfg = Config::default();
        let sessions = vec![
            session(1, SessionState::Active, 0),
            session(2, SessionState::Idle, 10),
        ];
        let output = build_output(&cfg, &pool(10), &sessions, &[], Severity::None, true);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["connections"].as_array().unwrap().len(), 2);
        assert_eq!(value["connections"][0]["state"], "active");
    }

    #[test]
    fn test_severity_markers() {
        assert_eq!(severity_marker(Severity::None), "");
        assert_eq!(severity_marker(Severity::Warning), " [WARN]");
        assert_eq!(severity_marker(Severity::Critical), " [CRIT]");
    }
}
