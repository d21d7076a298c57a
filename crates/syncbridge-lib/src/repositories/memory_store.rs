// In-Memory Store
// HashMap-backed store for tests and embedding hosts without a database

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult, SyncOutcome, TriggerOutcome};
use crate::models::{ActivityFilter, ActivityLogEntry, Integration, Webhook};

#[derive(Debug, Default)]
pub struct MemoryStore {
    integrations: RwLock<HashMap<String, Integration>>,
    webhooks: RwLock<HashMap<String, Webhook>>,
    activity: RwLock<Vec<ActivityLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_integration(&self, integration: &Integration) -> StoreResult<()> {
        let mut map = self.integrations.write().await;
        if map.contains_key(&integration.id) {
            return Err(StoreError::Conflict {
                kind: "integration",
                id: integration.id.clone(),
            });
        }
        map.insert(integration.id.clone(), integration.clone());
        Ok(())
    }

    async fn update_integration(&self, integration: &Integration) -> StoreResult<()> {
        let mut map = self.integrations.write().await;
        match map.get_mut(&integration.id) {
            Some(existing) => {
                existing.name = integration.name.clone();
                existing.integration_type = integration.integration_type;
                existing.provider = integration.provider.clone();
                existing.config = integration.config.clone();
                existing.credentials = integration.credentials.clone();
                existing.destination_id = integration.destination_id.clone();
                existing.message_template = integration.message_template.clone();
                existing.is_active = integration.is_active;
                existing.sync_interval_secs = integration.sync_interval_secs;
                existing.filter = integration.filter.clone();
                existing.transform = integration.transform.clone();
                existing.updated_at = integration.updated_at;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "integration",
                id: integration.id.clone(),
            }),
        }
    }

    async fn delete_integration(&self, id: &str) -> StoreResult<bool> {
        let removed = self.integrations.write().await.remove(id).is_some();
        if removed {
            // Mirror ON DELETE SET NULL
            for webhook in self.webhooks.write().await.values_mut() {
                if webhook.integration_id.as_deref() == Some(id) {
                    webhook.integration_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn get_integration(&self, id: &str) -> StoreResult<Option<Integration>> {
        Ok(self.integrations.read().await.get(id).cloned())
    }

    async fn list_integrations(&self) -> StoreResult<Vec<Integration>> {
        let mut list: Vec<Integration> = self.integrations.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn record_sync(&self, id: &str, outcome: &SyncOutcome) -> StoreResult<bool> {
        let mut map = self.integrations.write().await;
        let Some(integration) = map.get_mut(id) else {
            return Ok(false);
        };
        match &outcome.error {
            None => {
                integration.sync_count += 1;
                integration.last_sync_at = Some(outcome.completed_at);
            }
            Some(error) => {
                integration.error_count += 1;
                integration.last_error = Some(error.clone());
            }
        }
        integration.next_sync_at = outcome.next_sync_at;
        integration.updated_at = outcome.completed_at;
        Ok(true)
    }

    async fn set_next_sync(&self, id: &str, next_sync_at: Option<DateTime<Utc>>) -> StoreResult<bool> {
        match self.integrations.write().await.get_mut(id) {
            Some(integration) => {
                integration.next_sync_at = next_sync_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_webhook(&self, webhook: &Webhook) -> StoreResult<()> {
        let mut map = self.webhooks.write().await;
        if map.contains_key(&webhook.id) {
            return Err(StoreError::Conflict {
                kind: "webhook",
                id: webhook.id.clone(),
            });
        }
        map.insert(webhook.id.clone(), webhook.clone());
        Ok(())
    }

    async fn update_webhook(&self, webhook: &Webhook) -> StoreResult<()> {
        let mut map = self.webhooks.write().await;
        match map.get_mut(&webhook.id) {
            Some(existing) => {
                existing.integration_id = webhook.integration_id.clone();
                existing.name = webhook.name.clone();
                existing.destination_id = webhook.destination_id.clone();
                existing.secret = webhook.secret.clone();
                existing.events = webhook.events.clone();
                existing.is_active = webhook.is_active;
                existing.limits = webhook.limits;
                existing.updated_at = webhook.updated_at;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "webhook",
                id: webhook.id.clone(),
            }),
        }
    }

    async fn delete_webhook(&self, id: &str) -> StoreResult<bool> {
        Ok(self.webhooks.write().await.remove(id).is_some())
    }

    async fn get_webhook(&self, id: &str) -> StoreResult<Option<Webhook>> {
        Ok(self.webhooks.read().await.get(id).cloned())
    }

    async fn list_webhooks(&self) -> StoreResult<Vec<Webhook>> {
        let mut list: Vec<Webhook> = self.webhooks.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn record_trigger(&self, id: &str, outcome: &TriggerOutcome) -> StoreResult<bool> {
        let mut map = self.webhooks.write().await;
        let Some(webhook) = map.get_mut(id) else {
            return Ok(false);
        };
        match &outcome.error {
            None => webhook.success_count += 1,
            Some(error) => {
                webhook.failure_count += 1;
                webhook.last_error = Some(error.clone());
            }
        }
        webhook.last_triggered_at = Some(outcome.triggered_at);
        Ok(true)
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> StoreResult<()> {
        self.activity.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLogEntry>> {
        let entries = self.activity.read().await;
        let limit = filter.limit.unwrap_or(usize::MAX);
        // Appended in order, so reverse iteration is newest first
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}
