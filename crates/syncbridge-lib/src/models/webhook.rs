// Webhook Models
// Inbound endpoints that external senders push events to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::crypto::EncryptedData;

/// Wildcard event subscription
pub const ALL_EVENTS: &str = "*";

/// Per-webhook security limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLimits {
    pub max_payload_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub timeout_ms: u64,
}

impl Default for WebhookLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            rate_limit_per_minute: 60,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub scope_id: String,
    /// Integration whose type/config this webhook reuses
    pub integration_id: Option<String>,
    pub name: String,
    pub destination_id: String,
    /// Encrypted HMAC secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<EncryptedData>,
    pub events: Vec<String>,
    pub is_active: bool,
    pub limits: WebhookLimits,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether an inbound event name is subscribed
    pub fn accepts_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == ALL_EVENTS || e == event)
    }
}

/// Input for creating a webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWebhook {
    pub scope_id: String,
    #[serde(default)]
    pub integration_id: Option<String>,
    pub name: String,
    pub destination_id: String,
    /// Plaintext secret, encrypted before storage
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    #[serde(default)]
    pub limits: Option<WebhookLimits>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPatch {
    pub name: Option<String>,
    pub destination_id: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub limits: Option<WebhookLimits>,
}

fn default_events() -> Vec<String> {
    vec![ALL_EVENTS.to_string()]
}

/// Gateway response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTriggerResponse {
    pub success: bool,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook_with_events(events: &[&str]) -> Webhook {
        Webhook {
            id: "wh-1".to_string(),
            scope_id: "scope".to_string(),
            integration_id: None,
            name: "hook".to_string(),
            destination_id: "dest".to_string(),
            secret: None,
            events: events.iter().map(|e| e.to_string()).collect(),
            is_active: true,
            limits: WebhookLimits::default(),
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_accepts_event() {
        let wh = webhook_with_events(&["push"]);
        assert!(wh.accepts_event("push"));
        assert!(!wh.accepts_event("issue"));

        let wh = webhook_with_events(&["*"]);
        assert!(wh.accepts_event("anything"));

        let wh = webhook_with_events(&[]);
        assert!(!wh.accepts_event("push"));
    }

    #[test]
    fn test_new_webhook_defaults_to_wildcard() {
        let input: NewWebhook = serde_json::from_value(serde_json::json!({
            "scopeId": "s",
            "name": "n",
            "destinationId": "d"
        }))
        .unwrap();
        assert_eq!(input.events, vec!["*".to_string()]);
        assert!(input.limits.is_none());
    }
}
