//! pgsentryd - PostgreSQL idle-transaction monitoring daemon.
//!
//! Polls pg_stat_activity on a fixed interval, alerts on idle-in-transaction
//! sessions and connection pool pressure, and optionally terminates sessions
//! stuck past a configured threshold.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{info, warn};

use pgsentry::alerts::Dispatcher;
use pgsentry::cli::{init_logging, load_config};
use pgsentry::fmt::format_duration;
use pgsentry::monitor::{Monitor, MonitorConfig};
use pgsentry::pg::PgClient;

/// PostgreSQL idle-transaction monitoring daemon.
#[derive(Parser)]
#[command(name = "pgsentryd", about = "PostgreSQL idle-transaction monitoring daemon", version)]
struct Args {
    /// Config file (default: ~/.config/pgsentry/config.yaml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(args.config.as_deref())?;
    cfg.validate()?;

    info!("pgsentryd {} starting", env!("CARGO_PKG_VERSION"));

    let mut client = PgClient::new(&cfg.connection_string(), cfg.polling.timeout)?;
    client.try_connect()?;
    info!("connected to PostgreSQL");

    info!(
        polling_interval = %format!("{}s", cfg.polling.interval.as_secs()),
        warning_threshold = %format_duration(cfg.thresholds.idle_transaction.warning.as_secs() as i64),
        critical_threshold = %format_duration(cfg.thresholds.idle_transaction.critical.as_secs() as i64),
        alert_cooldown = %format_duration(cfg.alerts.cooldown.as_secs() as i64),
        "configuration loaded"
    );

    if cfg.auto_terminate.enabled {
        if cfg.auto_terminate.dry_run {
            info!(mode = "dry-run", "auto-terminate enabled");
        } else {
            info!(
                after = %format_duration(cfg.auto_terminate.after.as_secs() as i64),
                "auto-terminate enabled"
            );
        }
    }

    let dispatcher = Dispatcher::from_config(&cfg.alerts);
    if dispatcher.channel_count() == 0 {
        info!("no alert channels configured, events will only be logged");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to set Ctrl-C handler: {}", e);
    }

    let mut monitor = Monitor::new(MonitorConfig::from_config(&cfg), client, dispatcher);
    monitor.run(&running);

    info!("shutdown complete");
    Ok(())
}
