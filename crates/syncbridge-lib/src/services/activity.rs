// Activity Logger
// Writes one activity entry per sync attempt and per webhook request.
// Persistence failures are logged and swallowed so they never fail the caller.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::models::{
    ActivityFilter, ActivityLogEntry, ActivitySource, ActivityStatus, Integration,
};
use crate::repositories::{Store, StoreResult};

/// Header name fragments that are never written to the activity log
const SENSITIVE_HEADER_PATTERNS: &[&str] = &[
    "authorization",
    "cookie",
    "secret",
    "signature",
    "token",
    "api-key",
];

/// Drop headers whose names look sensitive; the rest become a JSON object
pub fn sanitize_headers(headers: &HeaderMap) -> Value {
    let mut sanitized = Map::new();
    for (name, value) in headers {
        let name = name.as_str().to_lowercase();
        let is_sensitive = SENSITIVE_HEADER_PATTERNS
            .iter()
            .any(|&pattern| name.contains(pattern));
        if is_sensitive {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        // Repeated headers are joined like a proxy would
        match sanitized.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                sanitized.insert(name, Value::String(value));
            }
        }
    }
    Value::Object(sanitized)
}

/// Snapshot of one finished webhook request
#[derive(Debug, Clone)]
pub struct WebhookRequestRecord {
    pub webhook_id: String,
    pub scope_id: Option<String>,
    pub integration_id: Option<String>,
    /// Request snapshot; headers must already be sanitized
    pub request: Value,
    pub status_code: u16,
    pub response: Value,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Config keys naming where a sync reads from, in order
const SOURCE_CONFIG_KEYS: &[&str] = &["api_url", "feed_url", "repository", "location"];

/// What a sync asked for. Credentials are never included and URLs lose
/// their query string and userinfo.
pub fn sync_request(integration: &Integration) -> Value {
    let source = SOURCE_CONFIG_KEYS
        .iter()
        .find_map(|key| integration.config_str(key))
        .map(strip_url_secrets);
    serde_json::json!({
        "integrationType": integration.integration_type.as_str(),
        "provider": integration.provider,
        "method": integration.config_str("method"),
        "source": source,
    })
}

fn strip_url_secrets(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if url.has_host() => {
            url.set_query(None);
            url.set_fragment(None);
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn Store>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a sync attempt. `outcome` carries the report on success.
    pub async fn log_sync(
        &self,
        integration: &Integration,
        duration_ms: u64,
        outcome: Result<Value, String>,
    ) {
        let (status, response, error_message) = match outcome {
            Ok(report) => (ActivityStatus::Success, Some(report), None),
            Err(error) => (ActivityStatus::Failed, None, Some(error)),
        };

        self.append(ActivityLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            scope_id: Some(integration.scope_id.clone()),
            integration_id: Some(integration.id.clone()),
            webhook_id: None,
            source: ActivitySource::Sync,
            status,
            request: Some(sync_request(integration)),
            response,
            duration_ms,
            error_message,
            retry_count: 0,
            created_at: Utc::now(),
        })
        .await;
    }

    /// Record a webhook request, whichever gateway step ended it
    pub async fn log_webhook(&self, record: WebhookRequestRecord) {
        let succeeded = (200..300).contains(&record.status_code) && record.error.is_none();
        let status = if succeeded {
            ActivityStatus::Success
        } else {
            ActivityStatus::Failed
        };

        let mut response = Map::new();
        response.insert("statusCode".to_string(), Value::from(record.status_code));
        response.insert("body".to_string(), record.response);

        self.append(ActivityLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            scope_id: record.scope_id,
            integration_id: record.integration_id,
            webhook_id: Some(record.webhook_id),
            source: ActivitySource::Webhook,
            status,
            request: Some(record.request),
            response: Some(Value::Object(response)),
            duration_ms: record.duration_ms,
            error_message: record.error,
            retry_count: 0,
            created_at: Utc::now(),
        })
        .await;
    }

    async fn append(&self, entry: ActivityLogEntry) {
        if let Err(e) = self.store.append_activity(&entry).await {
            log::error!(
                "[activity] Failed to write {} entry {}: {}",
                entry.source.as_str(),
                entry.id,
                e
            );
        }
    }

    pub async fn list(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLogEntry>> {
        self.store.list_activity(filter).await
    }
}
