// Integration Models
// Configured connectors between an external source and a destination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pipeline::{FilterSpec, TransformSpec};
use crate::services::crypto::EncryptedData;

/// Kind of external source an integration talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    OutboundWebhook,
    RestApi,
    Feed,
    CodeHosting,
    Weather,
    Custom,
}

impl IntegrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::OutboundWebhook => "outbound_webhook",
            IntegrationType::RestApi => "rest_api",
            IntegrationType::Feed => "feed",
            IntegrationType::CodeHosting => "code_hosting",
            IntegrationType::Weather => "weather",
            IntegrationType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "outbound_webhook" => Some(IntegrationType::OutboundWebhook),
            "rest_api" => Some(IntegrationType::RestApi),
            "feed" => Some(IntegrationType::Feed),
            "code_hosting" => Some(IntegrationType::CodeHosting),
            "weather" => Some(IntegrationType::Weather),
            "custom" => Some(IntegrationType::Custom),
            _ => None,
        }
    }

    /// Config keys that must be present before the integration can sync
    pub fn required_config_keys(&self) -> &'static [&'static str] {
        match self {
            IntegrationType::RestApi | IntegrationType::Custom => &["api_url"],
            IntegrationType::Feed => &["feed_url"],
            IntegrationType::CodeHosting => &["repository"],
            IntegrationType::Weather | IntegrationType::OutboundWebhook => &[],
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured, optionally scheduled integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    /// Owner scope (guild, workspace, tenant)
    pub scope_id: String,
    pub name: String,
    pub integration_type: IntegrationType,
    /// Free-form provider label, e.g. "openweathermap"
    pub provider: Option<String>,
    /// Type-specific configuration
    pub config: serde_json::Value,
    /// Encrypted credential object (see `CredentialVault::encrypt_json`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<EncryptedData>,
    pub destination_id: String,
    pub message_template: Option<String>,
    pub is_active: bool,
    /// Poll interval in seconds; `None` means manual syncs only
    pub sync_interval_secs: Option<i64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub sync_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub filter: Option<FilterSpec>,
    pub transform: Option<TransformSpec>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    /// Positive poll interval, if this integration auto-polls
    pub fn poll_interval(&self) -> Option<i64> {
        self.sync_interval_secs.filter(|secs| *secs > 0)
    }

    /// Read a string value from the config object
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Input for creating an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntegration {
    pub scope_id: String,
    pub name: String,
    pub integration_type: IntegrationType,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
    /// Plaintext credentials, encrypted before storage
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
    pub destination_id: String,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sync_interval_secs: Option<i64>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Partial update for an integration; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPatch {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub config: Option<serde_json::Value>,
    pub credentials: Option<serde_json::Value>,
    pub destination_id: Option<String>,
    pub message_template: Option<String>,
    pub is_active: Option<bool>,
    /// `Some(None)` clears the interval
    #[serde(default, with = "double_option")]
    pub sync_interval_secs: Option<Option<i64>>,
    pub filter: Option<FilterSpec>,
    pub transform: Option<TransformSpec>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_true() -> bool {
    true
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<i64>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<i64>>, D::Error> {
        Option::<i64>::deserialize(d).map(Some)
    }
}
