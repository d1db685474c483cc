//! SQL text for the monitoring queries.
//!
//! Timestamps come back as epoch seconds (`EXTRACT(EPOCH ...)::bigint`)
//! and every nullable column is COALESCEd, so row mapping never deals
//! with NULL. `collected_at` is the server's own clock, captured in the
//! same statement as the rows it anchors.

/// Client backend sessions, newest state change first. The monitor's own
/// backend is filtered out so it never alerts on itself.
pub(super) const SESSIONS: &str = r#"
    SELECT
        pid,
        COALESCE(usename, '') as usename,
        COALESCE(application_name, '') as application_name,
        COALESCE(client_addr::text, 'local') as client_addr,
        COALESCE(state, '') as state,
        COALESCE(EXTRACT(EPOCH FROM state_change)::bigint, 0) as state_change,
        COALESCE(EXTRACT(EPOCH FROM xact_start)::bigint, 0) as xact_start,
        COALESCE(LEFT(query, 500), '') as query,
        EXTRACT(EPOCH FROM now())::bigint as collected_at
    FROM pg_stat_activity
    WHERE backend_type = 'client backend'
      AND pid != pg_backend_pid()
    ORDER BY state_change DESC
"#;

/// Connection counts per backend state.
pub(super) const STATE_COUNTS: &str = r#"
    SELECT
        COALESCE(state, 'unknown') as state,
        COUNT(*)::bigint as count
    FROM pg_stat_activity
    WHERE backend_type = 'client backend'
      AND pid != pg_backend_pid()
    GROUP BY state
"#;

/// Integer server setting by name (max_connections etc).
pub(super) const INT_SETTING: &str =
    "SELECT setting::bigint FROM pg_settings WHERE name = $1";

pub(super) const TERMINATE_BACKEND: &str = "SELECT pg_terminate_backend($1)";

pub(super) const CANCEL_BACKEND: &str = "SELECT pg_cancel_backend($1)";
