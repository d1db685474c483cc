//! Synchronous PostgreSQL access.
//!
//! A single [`PgClient`] serves all queries. The connection is established
//! lazily and dropped on any query error, so the next call reconnects.
//! TLS is negotiated per the connection string's `sslmode` via native-tls.

pub mod models;
mod queries;

pub use models::{PoolStats, Session, SessionState};

use std::time::Duration;

use native_tls::TlsConnector;
use postgres::Client;
use postgres::types::ToSql;
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

/// Error type for database access.
#[derive(Debug)]
pub enum PgError {
    /// Connection string or TLS setup rejected.
    Config(String),
    /// Connection failed.
    Connection(String),
    /// Query execution failed.
    Query(String),
}

impl std::fmt::Display for PgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgError::Config(msg) => write!(f, "PostgreSQL config: {}", msg),
            PgError::Connection(msg) => write!(f, "PostgreSQL: {}", msg),
            PgError::Query(msg) => write!(f, "PostgreSQL query error: {}", msg),
        }
    }
}

impl std::error::Error for PgError {}

/// Monitoring client over one PostgreSQL connection.
pub struct PgClient {
    config: postgres::Config,
    tls: MakeTlsConnector,
    statement_timeout_ms: u64,
    client: Option<Client>,
}

impl PgClient {
    /// Builds a client from a resolved connection string (libpq key=value
    /// or URL form). No connection is attempted until the first query.
    ///
    /// `query_timeout` becomes the server-side `statement_timeout`, so a
    /// wedged server cannot stall a poll cycle indefinitely.
    pub fn new(conn_str: &str, query_timeout: Duration) -> Result<Self, PgError> {
        let mut config: postgres::Config = conn_str
            .parse()
            .map_err(|e: postgres::Error| PgError::Config(e.to_string()))?;
        if config.get_application_name().is_none() {
            config.application_name("pgsentry");
        }
        let connector =
            TlsConnector::new().map_err(|e| PgError::Config(format!("TLS setup: {}", e)))?;
        Ok(Self {
            config,
            tls: MakeTlsConnector::new(connector),
            statement_timeout_ms: query_timeout.as_millis() as u64,
            client: None,
        })
    }

    /// Attempts to connect. Useful as a startup check before entering the
    /// monitoring loop.
    pub fn try_connect(&mut self) -> Result<(), PgError> {
        self.ensure_connected()
    }

    fn ensure_connected(&mut self) -> Result<(), PgError> {
        if self.client.is_some() {
            return Ok(());
        }

        match self.config.connect(self.tls.clone()) {
            Ok(mut client) => {
                let set_timeout =
                    format!("SET statement_timeout = {}", self.statement_timeout_ms);
                if let Err(e) = client.batch_execute(&set_timeout) {
                    return Err(PgError::Connection(format_pg_error(&e)));
                }
                debug!("connected to PostgreSQL");
                self.client = Some(client);
                Ok(())
            }
            Err(e) => Err(PgError::Connection(format_pg_error(&e))),
        }
    }

    /// Runs a query, dropping the connection on failure so the next call
    /// reconnects from scratch.
    fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<postgres::Row>, PgError> {
        self.ensure_connected()?;
        let client = self.client.as_mut().unwrap();
        match client.query(sql, params) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.client = None;
                Err(PgError::Query(format_pg_error(&e)))
            }
        }
    }

    /// Round-trips a trivial query.
    pub fn ping(&mut self) -> Result<(), PgError> {
        self.query("SELECT 1", &[]).map(|_| ())
    }

    /// All client backend sessions, this monitor's own backend excluded.
    pub fn sessions(&mut self) -> Result<Vec<Session>, PgError> {
        let rows = self.query(queries::SESSIONS, &[])?;
        Ok(rows
            .iter()
            .map(|row| {
                let state: String = row.get("state");
                Session {
                    pid: row.get("pid"),
                    username: row.get("usename"),
                    application_name: row.get("application_name"),
                    client_addr: row.get("client_addr"),
                    state: SessionState::parse(&state),
                    state_change: row.get("state_change"),
                    xact_start: row.get("xact_start"),
                    query: row.get("query"),
                    collected_at: row.get("collected_at"),
                }
            })
            .collect())
    }

    /// Sessions currently idle in a transaction.
    pub fn idle_transactions(&mut self) -> Result<Vec<Session>, PgError> {
        Ok(self
            .sessions()?
            .into_iter()
            .filter(|s| s.is_idle_in_transaction())
            .collect())
    }

    /// Aggregate pool statistics from pg_settings and pg_stat_activity.
    pub fn pool_stats(&mut self) -> Result<PoolStats, PgError> {
        let max_connections = self.int_setting("max_connections")?;
        let reserved_superuser = self.int_setting("superuser_reserved_connections")?;

        let rows = self.query(queries::STATE_COUNTS, &[])?;
        let mut stats = PoolStats {
            max_connections,
            reserved_superuser,
            ..Default::default()
        };
        for row in &rows {
            let state: String = row.get("state");
            let count: i64 = row.get("count");
            stats.total += count;
            match SessionState::parse(&state) {
                SessionState::Active => stats.active = count,
                SessionState::Idle => stats.idle = count,
                s if s.is_idle_in_transaction() => stats.idle_in_transaction += count,
                _ => {}
            }
        }
        Ok(stats)
    }

    fn int_setting(&mut self, name: &str) -> Result<i64, PgError> {
        let rows = self.query(queries::INT_SETTING, &[&name])?;
        match rows.first() {
            Some(row) => Ok(row.get(0)),
            None => Err(PgError::Query(format!("setting {} not found", name))),
        }
    }

    /// Terminates a backend. Returns the server's success flag, which is
    /// false when the PID was already gone.
    pub fn terminate_backend(&mut self, pid: i32) -> Result<bool, PgError> {
        let rows = self.query(queries::TERMINATE_BACKEND, &[&pid])?;
        Ok(rows.first().map(|row| row.get(0)).unwrap_or(false))
    }

    /// Cancels the current query on a backend without killing it.
    pub fn cancel_backend(&mut self, pid: i32) -> Result<bool, PgError> {
        let rows = self.query(queries::CANCEL_BACKEND, &[&pid])?;
        Ok(rows.first().map(|row| row.get(0)).unwrap_or(false))
    }
}

/// Formats a PostgreSQL error for display, preferring the server's own
/// severity and message when present.
fn format_pg_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}
