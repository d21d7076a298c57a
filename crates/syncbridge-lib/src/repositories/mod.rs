// Repository Layer
// Persistence abstraction consumed by the engine, with in-memory and SQLite backends

pub mod activity_repo;
pub mod integration_repo;
pub mod memory_store;
pub mod sqlite_store;
pub mod webhook_repo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ActivityFilter, ActivityLogEntry, Integration, Webhook};

pub use activity_repo::ActivityRepository;
pub use integration_repo::IntegrationRepository;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use webhook_repo::WebhookRepository;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "STORE_NOT_FOUND",
            StoreError::Conflict { .. } => "STORE_CONFLICT",
            StoreError::Backend(_) => "STORE_BACKEND_ERROR",
        }
    }
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        StoreError::Backend(message)
    }
}

impl From<StoreError> for String {
    fn from(err: StoreError) -> Self {
        err.to_string()
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of one sync attempt, applied atomically to the stored counters
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub completed_at: DateTime<Utc>,
    pub next_sync_at: Option<DateTime<Utc>>,
    /// `None` on success
    pub error: Option<String>,
}

/// Result of one dispatched webhook request
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub triggered_at: DateTime<Utc>,
    /// `None` on success
    pub error: Option<String>,
}

/// Storage collaborator supplied by the host
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_integration(&self, integration: &Integration) -> StoreResult<()>;

    /// Write the operator-editable fields; `NotFound` if it does not exist.
    /// Counters and sync timestamps are left untouched.
    async fn update_integration(&self, integration: &Integration) -> StoreResult<()>;

    /// Returns whether a row was deleted
    async fn delete_integration(&self, id: &str) -> StoreResult<bool>;

    async fn get_integration(&self, id: &str) -> StoreResult<Option<Integration>>;

    async fn list_integrations(&self) -> StoreResult<Vec<Integration>>;

    /// Apply counters and timestamps of a finished sync.
    /// Returns false when the integration no longer exists.
    async fn record_sync(&self, id: &str, outcome: &SyncOutcome) -> StoreResult<bool>;

    /// Persist the scheduler's next planned run; `None` when unscheduled.
    /// Returns false when the integration no longer exists.
    async fn set_next_sync(&self, id: &str, next_sync_at: Option<DateTime<Utc>>) -> StoreResult<bool>;

    async fn insert_webhook(&self, webhook: &Webhook) -> StoreResult<()>;

    /// Write the operator-editable fields; counters are left untouched
    async fn update_webhook(&self, webhook: &Webhook) -> StoreResult<()>;

    async fn delete_webhook(&self, id: &str) -> StoreResult<bool>;

    async fn get_webhook(&self, id: &str) -> StoreResult<Option<Webhook>>;

    async fn list_webhooks(&self) -> StoreResult<Vec<Webhook>>;

    /// Apply counters of a dispatched webhook request
    async fn record_trigger(&self, id: &str, outcome: &TriggerOutcome) -> StoreResult<bool>;

    async fn append_activity(&self, entry: &ActivityLogEntry) -> StoreResult<()>;

    /// Entries matching the filter, most recent first
    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLogEntry>>;
}
