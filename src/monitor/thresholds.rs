//! Threshold classification for monitored metrics.

use std::fmt;

/// Outcome of checking a metric against its warning/critical thresholds.
///
/// Ordered so that `max()` across several checks yields the worst one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `value` against a warning and a critical threshold.
///
/// Both comparisons are inclusive: a value exactly at a threshold crosses
/// it. Critical is checked first, so when the thresholds are equal (or
/// misordered) the critical classification wins.
pub fn classify<T: PartialOrd>(value: T, warning: T, critical: T) -> Severity {
    if value >= critical {
        Severity::Critical
    } else if value >= warning {
        Severity::Warning
    } else {
        Severity::None
    }
}
