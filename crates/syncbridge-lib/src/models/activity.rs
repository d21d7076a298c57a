// Activity Log Models
// One append-only entry per sync attempt and per webhook request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Sync,
    Webhook,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Sync => "sync",
            ActivitySource::Webhook => "webhook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sync" => Some(ActivitySource::Sync),
            "webhook" => Some(ActivitySource::Webhook),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Failed,
    Pending,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Pending => "pending",
            ActivityStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ActivityStatus::Success),
            "failed" => Some(ActivityStatus::Failed),
            "pending" => Some(ActivityStatus::Pending),
            "cancelled" => Some(ActivityStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: String,
    pub scope_id: Option<String>,
    pub integration_id: Option<String>,
    pub webhook_id: Option<String>,
    pub source: ActivitySource,
    pub status: ActivityStatus,
    /// Request snapshot with sanitized headers
    pub request: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Query for activity entries, most recent first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub integration_id: Option<String>,
    pub webhook_id: Option<String>,
    pub source: Option<ActivitySource>,
    pub limit: Option<usize>,
}

impl ActivityFilter {
    pub fn matches(&self, entry: &ActivityLogEntry) -> bool {
        if let Some(id) = &self.integration_id {
            if entry.integration_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(id) = &self.webhook_id {
            if entry.webhook_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(source) = self.source {
            if entry.source != source {
                return false;
            }
        }
        true
    }
}
