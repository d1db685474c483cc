//! Shared glue for the operator CLI and the daemon binary.

pub mod configure;
pub mod kill;
pub mod status;
pub mod watch;

use std::path::Path;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};

/// Initializes the tracing subscriber. Default level is INFO; -v for
/// DEBUG, -vv for TRACE, -q for errors only.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pgsentry={}", level).parse().unwrap())
        .add_directive(format!("pgsentryd={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads config from an explicit path, or the default location with a
/// fallback to built-in defaults when no file exists.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => Config::load(p),
        None => Config::load_or_default(),
    }
}

/// Exit codes shared by `status` and scripting around it.
pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNING: i32 = 1;
pub const EXIT_CRITICAL: i32 = 2;
