//! pgsentry - PostgreSQL idle-transaction and connection-pool monitor.
//!
//! This library provides the core functionality shared between:
//! - `pgsentryd` - monitoring daemon that polls, alerts, and optionally
//!   terminates stuck sessions
//! - `pgsentry` - operator CLI (status, watch, kill, configure)

pub mod alerts;
pub mod cli;
pub mod config;
pub mod fmt;
pub mod monitor;
pub mod pg;
