//! Row types for pg_stat_activity and pg_settings derived data.

use std::fmt;

/// Backend state as reported by pg_stat_activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Idle,
    IdleInTransaction,
    IdleInTransactionAborted,
    FastpathFunctionCall,
    Disabled,
    Unknown,
}

impl SessionState {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SessionState::Active,
            "idle" => SessionState::Idle,
            "idle in transaction" => SessionState::IdleInTransaction,
            "idle in transaction (aborted)" => SessionState::IdleInTransactionAborted,
            "fastpath function call" => SessionState::FastpathFunctionCall,
            "disabled" => SessionState::Disabled,
            _ => SessionState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Idle => "idle",
            SessionState::IdleInTransaction => "idle in transaction",
            SessionState::IdleInTransactionAborted => "idle in transaction (aborted)",
            SessionState::FastpathFunctionCall => "fastpath function call",
            SessionState::Disabled => "disabled",
            SessionState::Unknown => "unknown",
        }
    }

    /// True for both the plain and the aborted idle-in-transaction states.
    pub fn is_idle_in_transaction(&self) -> bool {
        matches!(
            self,
            SessionState::IdleInTransaction | SessionState::IdleInTransactionAborted
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client backend from pg_stat_activity.
///
/// Timestamps are epoch seconds extracted server-side; `collected_at` is
/// the server's `now()` captured in the same query, so durations computed
/// from it are immune to clock skew between monitor and database.
#[derive(Clone, Debug)]
pub struct Session {
    pub pid: i32,
    pub username: String,
    pub application_name: String,
    pub client_addr: String,
    pub state: SessionState,
    /// Last state change, epoch seconds (0 when unknown).
    pub state_change: i64,
    /// Transaction start, epoch seconds (0 when no open transaction).
    pub xact_start: i64,
    pub query: String,
    pub collected_at: i64,
}

impl Session {
    /// Seconds spent in the current state.
    pub fn idle_secs(&self) -> i64 {
        if self.state_change <= 0 {
            return 0;
        }
        (self.collected_at - self.state_change).max(0)
    }

    /// Seconds the current transaction has been open, 0 if none.
    pub fn xact_secs(&self) -> i64 {
        if self.xact_start <= 0 {
            return 0;
        }
        (self.collected_at - self.xact_start).max(0)
    }

    pub fn is_idle_in_transaction(&self) -> bool {
        self.state.is_idle_in_transaction()
    }
}

/// Aggregate connection counts against server limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub max_connections: i64,
    pub reserved_superuser: i64,
    pub total: i64,
    pub active: i64,
    pub idle: i64,
    pub idle_in_transaction: i64,
}

impl PoolStats {
    /// Slots usable by regular roles (max minus the superuser reserve).
    pub fn max_available(&self) -> i64 {
        self.max_connections - self.reserved_superuser
    }

    /// Slots currently free for regular roles.
    pub fn available(&self) -> i64 {
        self.max_available() - self.total
    }

    /// Pool usage as a percentage of non-reserved slots.
    ///
    /// Reports 100 when the superuser reserve swallows the whole pool,
    /// since no regular connection can be admitted in that configuration.
    pub fn usage_percent(&self) -> f64 {
        let available = self.max_available();
        if available <= 0 {
            return 100.0;
        }
        self.total as f64 / available as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent_half_full() {
        let stats = PoolStats {
            max_connections: 100,
            reserved_superuser: 0,
            total: 50,
            ..Default::default()
        };
        assert_eq!(stats.usage_percent(), 50.0);
    }

    #[test]
    fn test_usage_percent_accounts_for_reserved() {
        // 97 in use of 100-3 usable slots: fully saturated
        let stats = PoolStats {
            max_connections: 100,
            reserved_superuser: 3,
            total: 97,
            ..Default::default()
        };
        assert_eq!(stats.usage_percent(), 100.0);
    }

    #[test]
    fn test_usage_percent_empty_pool() {
        let stats = PoolStats {
            max_connections: 100,
            reserved_superuser: 3,
            total: 0,
            ..Default::default()
        };
        assert_eq!(stats.usage_percent(), 0.0);
    }

    #[test]
    fn test_usage_percent_degenerate_reserve() {
        let stats = PoolStats {
            max_connections: 3,
            reserved_superuser: 3,
            total: 1,
            ..Default::default()
        };
        assert_eq!(stats.usage_percent(), 100.0);
    }

    #[test]
    fn test_available_slots() {
        let stats = PoolStats {
            max_connections: 100,
            reserved_superuser: 3,
            total: 87,
            ..Default::default()
        };
        assert_eq!(stats.available(), 10);
        assert_eq!(stats.max_available(), 97);
    }

    #[test]
    fn test_state_parse_and_display() {
        assert_eq!(SessionState::parse("active"), SessionState::Active);
        assert_eq!(
            SessionState::parse("idle in transaction"),
            SessionState::IdleInTransaction
        );
        assert_eq!(
            SessionState::parse("idle in transaction (aborted)"),
            SessionState::IdleInTransactionAborted
        );
        assert_eq!(SessionState::parse("bogus"), SessionState::Unknown);
        assert_eq!(SessionState::IdleInTransaction.to_string(), "idle in transaction");
    }

    #[test]
    fn test_is_idle_in_transaction() {
        assert!(SessionState::IdleInTransaction.is_idle_in_transaction());
        assert!(SessionState::IdleInTransactionAborted.is_idle_in_transaction());
        assert!(!SessionState::Active.is_idle_in_transaction());
        assert!(!SessionState::Idle.is_idle_in_transaction());
        assert!(!SessionState::FastpathFunctionCall.is_idle_in_transaction());
        assert!(!SessionState::Disabled.is_idle_in_transaction());
    }

    fn session_at(state_change: i64, collected_at: i64) -> Session {
        Session {
            pid: 1,
            username: "app".to_string(),
            application_name: "api".to_string(),
            client_addr: "10.0.0.5".to_string(),
            state: SessionState::IdleInTransaction,
            state_change,
            xact_start: 0,
            query: String::new(),
            collected_at,
        }
    }

    #[test]
    fn test_idle_secs_from_server_clock() {
        assert_eq!(session_at(1_000_000, 1_000_120).idle_secs(), 120);
    }

    #[test]
    fn test_idle_secs_missing_state_change() {
        assert_eq!(session_at(0, 1_000_120).idle_secs(), 0);
    }

    #[test]
    fn test_idle_secs_never_negative() {
        assert_eq!(session_at(1_000_200, 1_000_120).idle_secs(), 0);
    }

    #[test]
    fn test_xact_secs() {
        let mut s = session_at(1_000_000, 1_000_120);
        assert_eq!(s.xact_secs(), 0);
        s.xact_start = 1_000_100;
        assert_eq!(s.xact_secs(), 20);
    }
}
