//! Pure text formatting helpers shared by the daemon, CLI, and alerts.

/// Format a duration in seconds as human-readable: `"45s"`, `"2m 30s"`,
/// `"1h 15m"`. Zero and negative values render as `"0s"`.
pub fn format_duration(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncate a string to at most `max_len` characters, appending `"..."`
/// when anything was cut. Counts chars, not bytes, so multibyte query
/// text never splits mid-character.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{}...", head)
}

/// Normalize query text to a single line (collapse all whitespace runs
/// to single spaces) and truncate to `max_len`.
pub fn truncate_query(query: &str, max_len: usize) -> String {
    let flat = query.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&flat, max_len)
}
