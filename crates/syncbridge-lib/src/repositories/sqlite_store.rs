// SQLite Store
// Store implementation backed by the SQLite repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ActivityRepository, IntegrationRepository, Store, StoreError, StoreResult, SyncOutcome,
    TriggerOutcome, WebhookRepository,
};
use crate::models::{ActivityFilter, ActivityLogEntry, Integration, Webhook};
use crate::utils::database::Database;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    integrations: IntegrationRepository,
    webhooks: WebhookRepository,
    activity: ActivityRepository,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            integrations: IntegrationRepository::new(db.clone()),
            webhooks: WebhookRepository::new(db.clone()),
            activity: ActivityRepository::new(db),
        }
    }

    /// Open (or create) the database file and wrap it
    pub fn open(path: impl AsRef<std::path::Path>) -> StoreResult<Self> {
        Ok(Self::new(Database::new(path)?))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_integration(&self, integration: &Integration) -> StoreResult<()> {
        if self.integrations.get(&integration.id)?.is_some() {
            return Err(StoreError::Conflict {
                kind: "integration",
                id: integration.id.clone(),
            });
        }
        Ok(self.integrations.create(integration)?)
    }

    async fn update_integration(&self, integration: &Integration) -> StoreResult<()> {
        if self.integrations.update(integration)? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "integration",
                id: integration.id.clone(),
            })
        }
    }

    async fn delete_integration(&self, id: &str) -> StoreResult<bool> {
        Ok(self.integrations.delete(id)?)
    }

    async fn get_integration(&self, id: &str) -> StoreResult<Option<Integration>> {
        Ok(self.integrations.get(id)?)
    }

    async fn list_integrations(&self) -> StoreResult<Vec<Integration>> {
        Ok(self.integrations.list()?)
    }

    async fn record_sync(&self, id: &str, outcome: &SyncOutcome) -> StoreResult<bool> {
        Ok(self.integrations.record_sync(id, outcome)?)
    }

    async fn set_next_sync(&self, id: &str, next_sync_at: Option<DateTime<Utc>>) -> StoreResult<bool> {
        Ok(self.integrations.set_next_sync(id, next_sync_at)?)
    }

    async fn insert_webhook(&self, webhook: &Webhook) -> StoreResult<()> {
        if self.webhooks.get(&webhook.id)?.is_some() {
            return Err(StoreError::Conflict {
                kind: "webhook",
                id: webhook.id.clone(),
            });
        }
        Ok(self.webhooks.create(webhook)?)
    }

    async fn update_webhook(&self, webhook: &Webhook) -> StoreResult<()> {
        if self.webhooks.update(webhook)? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "webhook",
                id: webhook.id.clone(),
            })
        }
    }

    async fn delete_webhook(&self, id: &str) -> StoreResult<bool> {
        Ok(self.webhooks.delete(id)?)
    }

    async fn get_webhook(&self, id: &str) -> StoreResult<Option<Webhook>> {
        Ok(self.webhooks.get(id)?)
    }

    async fn list_webhooks(&self) -> StoreResult<Vec<Webhook>> {
        Ok(self.webhooks.list()?)
    }

    async fn record_trigger(&self, id: &str, outcome: &TriggerOutcome) -> StoreResult<bool> {
        Ok(self.webhooks.record_trigger(id, outcome)?)
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> StoreResult<()> {
        Ok(self.activity.append(entry)?)
    }

    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLogEntry>> {
        Ok(self.activity.list(filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_integration, sample_webhook};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_round_trip_through_trait() {
        let dir = tempdir().unwrap();
        let store: Box<dyn Store> = Box::new(SqliteStore::open(dir.path().join("store.db")).unwrap());

        store.insert_integration(&sample_integration("int-1")).await.unwrap();
        assert!(matches!(
            store.insert_integration(&sample_integration("int-1")).await,
            Err(StoreError::Conflict { .. })
        ));
        store.insert_webhook(&sample_webhook("wh-1", Some("int-1"))).await.unwrap();

        assert_eq!(store.list_integrations().await.unwrap().len(), 1);
        assert_eq!(
            store.get_webhook("wh-1").await.unwrap().unwrap().integration_id.as_deref(),
            Some("int-1")
        );

        let missing = sample_integration("nope");
        assert!(matches!(
            store.update_integration(&missing).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_integration(&sample_integration("int-1")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_integration("int-1").await.unwrap().is_some());
    }
}
