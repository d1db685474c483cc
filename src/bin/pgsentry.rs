//! pgsentry - operator CLI for the idle-transaction monitor.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};

use pgsentry::cli::{self, configure, init_logging, kill, load_config, status, watch};

/// Monitor PostgreSQL connections and catch idle transactions.
#[derive(Parser)]
#[command(
    name = "pgsentry",
    about = "Monitor PostgreSQL connections and catch idle transactions",
    version
)]
struct Cli {
    /// Config file (default: ~/.config/pgsentry/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current connection pool status (exit code 0/1/2 = ok/warning/critical).
    Status {
        /// Show all connections, not just idle transactions.
        #[arg(short, long)]
        verbose: bool,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
        /// No output, only the exit code.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Monitor connections in real-time.
    Watch {
        /// Polling interval in seconds.
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },
    /// Terminate a database connection by PID.
    Kill {
        pid: i32,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
        /// Cancel the current query instead of terminating the backend.
        #[arg(long)]
        cancel: bool,
    },
    /// Interactive configuration wizard.
    Configure {
        #[command(subcommand)]
        action: Option<ConfigureAction>,
    },
}

#[derive(Subcommand)]
enum ConfigureAction {
    /// Show the effective configuration.
    Show,
    /// Validate config and test the database and alert channels.
    Test,
}

fn main() {
    let args = Cli::parse();
    init_logging(0, false);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    // the wizard builds its own config, everything else loads one
    if let Command::Configure { action: None } = args.command {
        return configure::run_wizard();
    }

    let cfg = load_config(args.config.as_deref())?;

    match args.command {
        Command::Status { verbose, json, quiet } => status::run(&cfg, verbose, json, quiet),
        Command::Watch { interval } => {
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;
            watch::run(&cfg, Duration::from_secs(interval), running)?;
            Ok(cli::EXIT_OK)
        }
        Command::Kill { pid, force, cancel } => kill::run(&cfg, pid, force, cancel),
        Command::Configure { action } => match action {
            Some(ConfigureAction::Show) => configure::run_show(&cfg),
            Some(ConfigureAction::Test) => configure::run_test(&cfg),
            None => unreachable!("handled above"),
        },
    }
}
