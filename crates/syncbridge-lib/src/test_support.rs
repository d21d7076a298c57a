// Shared fixtures for unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{DeliveryMessage, Integration, IntegrationType, Webhook, WebhookLimits};
use crate::services::connectors::{build_client, ConnectorContext};
use crate::services::delivery::{DeliveryResult, DeliverySink};

pub fn sample_integration(id: &str) -> Integration {
    let now = Utc::now();
    Integration {
        id: id.to_string(),
        scope_id: "scope".to_string(),
        name: "Sample".to_string(),
        integration_type: IntegrationType::RestApi,
        provider: None,
        config: serde_json::json!({ "api_url": "http://localhost/api" }),
        credentials: None,
        destination_id: "dest".to_string(),
        message_template: None,
        is_active: true,
        sync_interval_secs: Some(60),
        last_sync_at: None,
        next_sync_at: None,
        sync_count: 0,
        error_count: 0,
        last_error: None,
        filter: None,
        transform: None,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_webhook(id: &str, integration_id: Option<&str>) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: id.to_string(),
        scope_id: "scope".to_string(),
        integration_id: integration_id.map(String::from),
        name: "hook".to_string(),
        destination_id: "dest".to_string(),
        secret: None,
        events: vec!["*".to_string()],
        is_active: true,
        limits: WebhookLimits::default(),
        success_count: 0,
        failure_count: 0,
        last_triggered_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

/// Sink that records every message it receives
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, DeliveryMessage)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(String, DeliveryMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(&self, destination_id: &str, message: DeliveryMessage) -> DeliveryResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination_id.to_string(), message));
        Ok(())
    }
}

/// Serve a fixture router on an ephemeral local port and return its base URL
pub async fn spawn_fixture(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

/// Connector context with a short timeout
pub fn test_context(credentials: Option<serde_json::Value>) -> ConnectorContext {
    let client = build_client(std::time::Duration::from_secs(5)).unwrap();
    ConnectorContext::new(client, credentials)
}
