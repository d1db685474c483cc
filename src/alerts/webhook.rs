//! Generic HTTP webhook channel.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

use super::{AlertChannel, AlertError, AlertEvent, AlertSeverity};
use crate::fmt::{format_duration, truncate};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts a flat `{event, severity, timestamp, data}` JSON document to a
/// configurable endpoint. Method and extra headers come from config so
/// the channel can feed PagerDuty-style ingestion URLs without custom
/// code per vendor.
pub struct WebhookChannel {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    client: reqwest::blocking::Client,
}

impl WebhookChannel {
    pub fn new(
        url: String,
        method: String,
        headers: HashMap<String, String>,
    ) -> Result<Self, AlertError> {
        if url.is_empty() {
            return Err(AlertError::Config("webhook URL not configured".to_string()));
        }
        let method = if method.is_empty() {
            reqwest::Method::POST
        } else {
            method
                .to_uppercase()
                .parse()
                .map_err(|_| AlertError::Config(format!("invalid HTTP method: {}", method)))?
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("pgsentry")
            .build()
            .map_err(|e| AlertError::Config(e.to_string()))?;
        Ok(Self { url, method, headers, client })
    }

    fn payload(&self, event: &AlertEvent) -> Value {
        let (name, data) = match event {
            AlertEvent::PoolPressure { used, max_available, usage_percent, .. } => (
                "connection_pool",
                json!({
                    "used_connections": used,
                    "max_connections": max_available,
                    "available_connections": max_available - used,
                    "usage_percent": usage_percent,
                }),
            ),
            AlertEvent::SessionIdle { pid, application, idle_secs, query, .. } => (
                "idle_transaction",
                json!({
                    "pid": pid,
                    "application": application,
                    "duration_seconds": idle_secs,
                    "duration_human": format_duration(*idle_secs),
                    "query": truncate(query, 500),
                }),
            ),
            AlertEvent::SessionTerminated { pid, application, idle_secs, reason } => (
                "connection_terminated",
                json!({
                    "pid": pid,
                    "application": application,
                    "duration_seconds": idle_secs,
                    "duration_human": format_duration(*idle_secs),
                    "reason": reason,
                }),
            ),
            AlertEvent::SessionResolved { pid, application, total_secs } => (
                "idle_transaction_resolved",
                json!({
                    "pid": pid,
                    "application": application,
                    "duration_seconds": total_secs,
                    "duration_human": format_duration(*total_secs),
                }),
            ),
        };

        json!({
            "event": name,
            "severity": event.severity().as_str(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "data": data,
        })
    }

    fn post(&self, payload: &Value) -> Result<(), AlertError> {
        let mut request = self.client.request(self.method.clone(), &self.url).json(payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let response = request.send().map_err(|e| AlertError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let payload = self.payload(event);
        self.post(&payload)
    }

    fn test(&self) -> Result<(), AlertError> {
        let payload = json!({
            "event": "test",
            "severity": AlertSeverity::Info.as_str(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "data": { "message": "pgsentry webhook configured successfully" },
        });
        self.post(&payload)
    }
}
