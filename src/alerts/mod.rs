//! Alert events and channel fan-out.
//!
//! The monitor produces [`AlertEvent`] values; each configured channel
//! renders them into its own wire format. The [`Dispatcher`] owns the
//! channel list and isolates failures, so one unreachable endpoint never
//! blocks another channel or the poll cycle.

pub mod slack;
pub mod webhook;

pub use slack::SlackChannel;
pub use webhook::WebhookChannel;

use tracing::{error, info, warn};

use crate::config::AlertsConfig;

/// Error type for alert delivery.
#[derive(Debug)]
pub enum AlertError {
    /// Channel misconfigured (missing URL, bad method).
    Config(String),
    /// The HTTP request could not be sent.
    Request(String),
    /// The endpoint answered with a non-success status.
    Status(u16),
}

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertError::Config(msg) => write!(f, "channel config: {}", msg),
            AlertError::Request(msg) => write!(f, "sending request: {}", msg),
            AlertError::Status(code) => write!(f, "endpoint returned status {}", code),
        }
    }
}

impl std::error::Error for AlertError {}

/// Severity attached to a dispatched alert. Unlike the monitor's
/// threshold classification this includes the informational levels used
/// by termination and resolution notices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertSeverity {
    Warning,
    Critical,
    Info,
    Resolved,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Info => "info",
            AlertSeverity::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert produced by a poll cycle, channel-agnostic.
#[derive(Clone, Debug, PartialEq)]
pub enum AlertEvent {
    PoolPressure {
        severity: AlertSeverity,
        used: i64,
        max_available: i64,
        usage_percent: f64,
    },
    SessionIdle {
        severity: AlertSeverity,
        pid: i32,
        application: String,
        idle_secs: i64,
        query: String,
    },
    SessionTerminated {
        pid: i32,
        application: String,
        idle_secs: i64,
        reason: String,
    },
    SessionResolved {
        pid: i32,
        application: String,
        total_secs: i64,
    },
}

impl AlertEvent {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertEvent::PoolPressure { severity, .. } => *severity,
            AlertEvent::SessionIdle { severity, .. } => *severity,
            AlertEvent::SessionTerminated { .. } => AlertSeverity::Info,
            AlertEvent::SessionResolved { .. } => AlertSeverity::Resolved,
        }
    }
}

/// One delivery target for alert events.
pub trait AlertChannel {
    fn name(&self) -> &'static str;
    fn send(&self, event: &AlertEvent) -> Result<(), AlertError>;
    /// Sends a channel-specific test message, used at daemon startup and
    /// by `configure test`.
    fn test(&self) -> Result<(), AlertError>;
}

/// Fans one event out to every configured channel. Dispatch failures are
/// logged per channel and swallowed; alerting is best-effort.
#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    /// Builds the channel list from config, falling back to the
    /// conventional environment variables for URLs and sending a test
    /// message per channel so a dead webhook shows up at startup rather
    /// than at the first real alert.
    pub fn from_config(cfg: &AlertsConfig) -> Self {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();

        if cfg.slack.enabled {
            let mut url = cfg.slack.webhook_url.clone();
            if url.is_empty() {
                url = std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default();
            }
            if url.is_empty() {
                warn!("slack alerts enabled but no webhook URL configured");
            } else {
                match SlackChannel::new(url, cfg.slack.channel.clone(), cfg.slack.mention_users.clone()) {
                    Ok(channel) => {
                        info!(channel = %cfg.slack.channel, "slack alerts enabled");
                        if let Err(e) = channel.test() {
                            warn!("slack test failed: {}", e);
                        }
                        channels.push(Box::new(channel));
                    }
                    Err(e) => error!("slack channel setup failed: {}", e),
                }
            }
        }

        if cfg.webhook.enabled {
            let mut url = cfg.webhook.url.clone();
            if url.is_empty() {
                url = std::env::var("WEBHOOK_URL").unwrap_or_default();
            }
            if url.is_empty() {
                warn!("webhook alerts enabled but no URL configured");
            } else {
                match WebhookChannel::new(url.clone(), cfg.webhook.method.clone(), cfg.webhook.headers.clone()) {
                    Ok(channel) => {
                        info!(url = %url, method = %cfg.webhook.method, "webhook alerts enabled");
                        if let Err(e) = channel.test() {
                            warn!("webhook test failed: {}", e);
                        }
                        channels.push(Box::new(channel));
                    }
                    Err(e) => error!("webhook channel setup failed: {}", e),
                }
            }
        }

        Self::new(channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn dispatch(&self, event: &AlertEvent) {
        for channel in &self.channels {
            if let Err(e) = channel.send(event) {
                error!(channel = channel.name(), "failed to send alert: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        events: Arc<Mutex<Vec<AlertEvent>>>,
        fail: bool,
    }

    impl AlertChannel for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
            if self.fail {
                return Err(AlertError::Status(500));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
        fn test(&self) -> Result<(), AlertError> {
            Ok(())
        }
    }

    fn resolved_event() -> AlertEvent {
        AlertEvent::SessionResolved {
            pid: 1002,
            application: "api".to_string(),
            total_secs: 210,
        }
    }

    #[test]
    fn test_dispatch_reaches_all_channels() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(vec![
            Box::new(Recording { events: a.clone(), fail: false }),
            Box::new(Recording { events: b.clone(), fail: false }),
        ]);

        dispatcher.dispatch(&resolved_event());
        assert_eq!(a.lock().unwrap().len(), 1);
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failing_channel_does_not_block_others() {
        let ok = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(vec![
            Box::new(Recording { events: Arc::new(Mutex::new(Vec::new())), fail: true }),
            Box::new(Recording { events: ok.clone(), fail: false }),
        ]);

        dispatcher.dispatch(&resolved_event());
        dispatcher.dispatch(&resolved_event());
        assert_eq!(ok.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_dispatcher_is_a_no_op() {
        let dispatcher = Dispatcher::default();
        dispatcher.dispatch(&resolved_event());
        assert_eq!(dispatcher.channel_count(), 0);
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(resolved_event().severity(), AlertSeverity::Resolved);
        let e = AlertEvent::SessionTerminated {
            pid: 1,
            application: "x".to_string(),
            idle_secs: 10,
            reason: "auto-terminate threshold exceeded".to_string(),
        };
        assert_eq!(e.severity(), AlertSeverity::Info);
    }
}
