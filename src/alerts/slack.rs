//! Slack incoming-webhook channel.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::{AlertChannel, AlertError, AlertEvent, AlertSeverity};
use crate::fmt::{format_duration, truncate};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn severity_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "#FFA500",
        AlertSeverity::Critical => "#FF0000",
        AlertSeverity::Info => "#0000FF",
        AlertSeverity::Resolved => "#00FF00",
    }
}

#[derive(Debug, Serialize)]
struct Message {
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Attachment {
    color: String,
    title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<Field>,
    footer: &'static str,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct Field {
    title: &'static str,
    value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    short: bool,
}

impl Field {
    fn short(title: &'static str, value: String) -> Self {
        Self { title, value, short: true }
    }

    fn long(title: &'static str, value: String) -> Self {
        Self { title, value, short: false }
    }
}

/// Sends alerts to a Slack incoming webhook. Critical alerts prepend the
/// configured user mentions so they break through notification filters.
pub struct SlackChannel {
    url: String,
    channel: String,
    mentions: Vec<String>,
    client: reqwest::blocking::Client,
}

impl SlackChannel {
    pub fn new(url: String, channel: String, mentions: Vec<String>) -> Result<Self, AlertError> {
        if url.is_empty() {
            return Err(AlertError::Config("slack webhook URL not configured".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AlertError::Config(e.to_string()))?;
        Ok(Self { url, channel, mentions, client })
    }

    fn mention_text(&self, severity: AlertSeverity) -> String {
        if severity != AlertSeverity::Critical || self.mentions.is_empty() {
            return String::new();
        }
        let mut text = String::new();
        for mention in &self.mentions {
            text.push_str(mention);
            text.push(' ');
        }
        text
    }

    fn render(&self, event: &AlertEvent) -> Message {
        let severity = event.severity();
        let attachment = match event {
            AlertEvent::SessionIdle { severity, pid, application, idle_secs, query } => Attachment {
                color: severity_color(*severity).to_string(),
                title: format!("Idle Transaction [{}]", severity),
                text: String::new(),
                fields: vec![
                    Field::short("Application", application.clone()),
                    Field::short("PID", pid.to_string()),
                    Field::short("Idle Duration", format_duration(*idle_secs)),
                    Field::short("Severity", severity.to_string()),
                    Field::long("Query", truncate(query, 200)),
                ],
                footer: "pgsentry",
                ts: Utc::now().timestamp(),
            },
            AlertEvent::PoolPressure { severity, used, max_available, usage_percent } => Attachment {
                color: severity_color(*severity).to_string(),
                title: format!("Connection Pool [{}]", severity),
                text: String::new(),
                fields: vec![
                    Field::short("Usage", format!("{:.0}%", usage_percent)),
                    Field::short("Connections", format!("{} / {}", used, max_available)),
                    Field::short("Available", (max_available - used).to_string()),
                    Field::short("Severity", severity.to_string()),
                ],
                footer: "pgsentry",
                ts: Utc::now().timestamp(),
            },
            AlertEvent::SessionTerminated { pid, application, idle_secs, reason } => Attachment {
                color: severity_color(AlertSeverity::Info).to_string(),
                title: "Connection Terminated".to_string(),
                text: String::new(),
                fields: vec![
                    Field::short("Application", application.clone()),
                    Field::short("PID", pid.to_string()),
                    Field::short("Was Idle For", format_duration(*idle_secs)),
                    Field::short("Reason", reason.clone()),
                ],
                footer: "pgsentry",
                ts: Utc::now().timestamp(),
            },
            AlertEvent::SessionResolved { pid, application, total_secs } => Attachment {
                color: severity_color(AlertSeverity::Resolved).to_string(),
                title: "Idle Transaction Resolved".to_string(),
                text: String::new(),
                fields: vec![
                    Field::short("Application", application.clone()),
                    Field::short("PID", pid.to_string()),
                    Field::short("Total Duration", format_duration(*total_secs)),
                ],
                footer: "pgsentry",
                ts: Utc::now().timestamp(),
            },
        };

        Message {
            channel: self.channel.clone(),
            text: self.mention_text(severity),
            attachments: vec![attachment],
        }
    }

    fn post(&self, message: &Message) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .map_err(|e| AlertError::Request(e.to_string()))?;
        // Slack answers exactly 200 on success
        if response.status().as_u16() != 200 {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

impl AlertChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let message = self.render(event);
        self.post(&message)
    }

    fn test(&self) -> Result<(), AlertError> {
        let message = Message {
            channel: self.channel.clone(),
            text: String::new(),
            attachments: vec![Attachment {
                color: severity_color(AlertSeverity::Resolved).to_string(),
                title: "pgsentry Connected".to_string(),
                text: "Slack alerts are configured correctly.".to_string(),
                fields: Vec::new(),
                footer: "pgsentry",
                ts: Utc::now().timestamp(),
            }],
        };
        self.post(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with_mentions(mentions: Vec<String>) -> SlackChannel {
        SlackChannel::new(
            "https://hooks.slack.com/services/T0/B0/x".to_string(),
            "#db-alerts".to_string(),
            mentions,
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_url() {
        assert!(SlackChannel::new(String::new(), String::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_mentions_only_on_critical() {
        let channel = channel_with_mentions(vec!["<@U123>".to_string(), "<@U456>".to_string()]);
        assert_eq!(channel.mention_text(AlertSeverity::Critical), "<@U123> <@U456> ");
        assert_eq!(channel.mention_text(AlertSeverity::Warning), "");
        assert_eq!(channel.mention_text(AlertSeverity::Info), "");
    }

    #[test]
    fn test_idle_alert_rendering() {
        let channel = channel_with_mentions(Vec::new());
        let msg = channel.render(&AlertEvent::SessionIdle {
            severity: AlertSeverity::Warning,
            pid: 1002,
            application: "payment-api".to_string(),
            idle_secs: 45,
            query: "UPDATE accounts SET balance = 0".to_string(),
        });
        assert_eq!(msg.channel, "#db-alerts");
        assert_eq!(msg.attachments.len(), 1);
        let att = &msg.attachments[0];
        assert_eq!(att.title, "Idle Transaction [warning]");
        assert_eq!(att.color, "#FFA500");
        assert_eq!(att.fields[2].value, "45s");
        assert_eq!(att.footer, "pgsentry");
    }

    #[test]
    fn test_pool_alert_rendering() {
        let channel = channel_with_mentions(Vec::new());
        let msg = channel.render(&AlertEvent::PoolPressure {
            severity: AlertSeverity::Critical,
            used: 92,
            max_available: 97,
            usage_percent: 94.8,
        });
        let att = &msg.attachments[0];
        assert_eq!(att.title, "Connection Pool [critical]");
        assert_eq!(att.color, "#FF0000");
        assert_eq!(att.fields[0].value, "95%");
        assert_eq!(att.fields[1].value, "92 / 97");
        assert_eq!(att.fields[2].value, "5");
    }

    #[test]
    fn test_query_field_is_bounded() {
        let channel = channel_with_mentions(Vec::new());
        let msg = channel.render(&AlertEvent::SessionIdle {
            severity: AlertSeverity::Critical,
            pid: 1,
            application: "x".to_string(),
            idle_secs: 120,
            query: "x".repeat(500),
        });
        let query_field = &msg.attachments[0].fields[4];
        assert!(query_field.value.chars().count() <= 200);
    }

    #[test]
    fn test_resolved_rendering() {
        let channel = channel_with_mentions(Vec::new());
        let msg = channel.render(&AlertEvent::SessionResolved {
            pid: 1002,
            application: "payment-api".to_string(),
            total_secs: 210,
        });
        let att = &msg.attachments[0];
        assert_eq!(att.title, "Idle Transaction Resolved");
        assert_eq!(att.color, "#00FF00");
        assert_eq!(att.fields[2].value, "3m 30s");
    }

    #[test]
    fn test_message_serialization_skips_empty() {
        let channel = SlackChannel::new(
            "https://hooks.slack.com/services/T0/B0/x".to_string(),
            String::new(),
            Vec::new(),
        )
        .unwrap();
        let msg = channel.render(&AlertEvent::SessionResolved {
            pid: 1,
            application: "x".to_string(),
            total_secs: 1,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("channel").is_none());
        assert!(json.get("text").is_none());
        assert!(json["attachments"][0].get("text").is_none());
    }
}
