// Sync Engine
// Public entry point: integration and webhook management, scheduling and the gateway

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ActivityFilter, ActivityLogEntry, Integration, IntegrationPatch, IntegrationType,
    NewIntegration, NewWebhook, SyncReport, Webhook, WebhookLimits, WebhookPatch,
};
use crate::repositories::Store;
use crate::services::activity::ActivityLogger;
use crate::services::connectors::{build_client, ConnectorRegistry, IntegrationExecutor};
use crate::services::crypto::{CredentialVault, EncryptedData};
use crate::services::delivery::DeliverySink;
use crate::services::incoming_webhook::{gateway_router, GatewayState};
use crate::services::processors::ProcessorRegistry;
use crate::services::rate_limit::RateLimiter;
use crate::services::scheduler::{RunStatus, Scheduler};

/// Components that only exist after `init()`
struct Runtime {
    scheduler: Scheduler,
    gateway: Arc<GatewayState>,
}

pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    sink: Arc<dyn DeliverySink>,
    vault: Arc<CredentialVault>,
    activity: ActivityLogger,
    connectors: ConnectorRegistry,
    processors: ProcessorRegistry,
    runtime: Option<Runtime>,
}

impl SyncEngine {
    /// Build an engine. Fails when the vault key is missing.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        sink: Arc<dyn DeliverySink>,
    ) -> EngineResult<Self> {
        let vault = Arc::new(CredentialVault::new(&config.vault_key)?);
        Ok(Self {
            activity: ActivityLogger::new(store.clone()),
            config,
            store,
            sink,
            vault,
            connectors: ConnectorRegistry::with_defaults(),
            processors: ProcessorRegistry::with_defaults(),
            runtime: None,
        })
    }

    /// Connector registrations take effect at `init()`
    pub fn connectors_mut(&mut self) -> &mut ConnectorRegistry {
        &mut self.connectors
    }

    /// Processor and classifier registrations take effect at `init()`
    pub fn processors_mut(&mut self) -> &mut ProcessorRegistry {
        &mut self.processors
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Start the scheduler and register every active integration with an interval
    pub async fn init(&mut self) -> EngineResult<()> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let client = build_client(self.config.http_timeout())?;
        let executor = IntegrationExecutor::new(
            self.connectors.clone(),
            self.vault.clone(),
            client,
            self.sink.clone(),
            self.config.max_items_per_sync,
        );
        let scheduler = Scheduler::new(
            self.store.clone(),
            executor,
            self.activity.clone(),
            self.config.scheduler_settings(),
        );
        let gateway = Arc::new(GatewayState {
            store: self.store.clone(),
            vault: self.vault.clone(),
            processors: self.processors.clone(),
            sink: self.sink.clone(),
            activity: self.activity.clone(),
            rate_limiter: RateLimiter::default(),
            feed_batch_cap: self.config.feed_batch_cap,
            max_body_bytes: self.config.max_body_bytes,
        });

        scheduler.init().await;
        let mut scheduled = 0;
        for integration in self.store.list_integrations().await? {
            if is_schedulable(&integration) {
                let id = integration.id.clone();
                let next_sync = scheduler.start(integration).await;
                self.store.set_next_sync(&id, Some(next_sync)).await?;
                scheduled += 1;
            }
        }
        log::info!("[engine] Initialized, {} integration(s) scheduled", scheduled);

        self.runtime = Some(Runtime { scheduler, gateway });
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Some(runtime) = &self.runtime {
            runtime.scheduler.shutdown().await;
        }
        log::info!("[engine] Shut down");
    }

    fn runtime(&self) -> EngineResult<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| EngineError::Config("engine is not initialized".to_string()))
    }

    /// Router serving `POST /webhooks/{webhook_id}`
    pub fn mount_gateway(&self) -> EngineResult<Router> {
        Ok(gateway_router(self.runtime()?.gateway.clone()))
    }

    // ========================================================================
    // Integrations
    // ========================================================================

    pub async fn create_integration(&self, input: NewIntegration) -> EngineResult<String> {
        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4().to_string(),
            scope_id: input.scope_id,
            name: input.name.trim().to_string(),
            integration_type: input.integration_type,
            provider: input.provider,
            config: input.config,
            credentials: self.encrypt_credentials(input.credentials.as_ref())?,
            destination_id: input.destination_id.trim().to_string(),
            message_template: input.message_template,
            is_active: input.is_active,
            sync_interval_secs: input.sync_interval_secs,
            last_sync_at: None,
            next_sync_at: None,
            sync_count: 0,
            error_count: 0,
            last_error: None,
            filter: input.filter,
            transform: input.transform,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        validate_integration(&integration)?;

        self.store.insert_integration(&integration).await?;
        log::info!(
            "[engine] Created {} integration {}",
            integration.integration_type,
            integration.id
        );

        let id = integration.id.clone();
        self.reschedule(integration).await?;
        Ok(id)
    }

    pub async fn update_integration(
        &self,
        id: &str,
        patch: IntegrationPatch,
    ) -> EngineResult<Integration> {
        let mut integration = self.get_integration(id).await?;

        if let Some(name) = patch.name {
            integration.name = name.trim().to_string();
        }
        if let Some(provider) = patch.provider {
            integration.provider = Some(provider);
        }
        if let Some(config) = patch.config {
            integration.config = config;
        }
        if let Some(credentials) = patch.credentials {
            integration.credentials = self.encrypt_credentials(Some(&credentials))?;
        }
        if let Some(destination_id) = patch.destination_id {
            integration.destination_id = destination_id.trim().to_string();
        }
        if let Some(template) = patch.message_template {
            integration.message_template = Some(template).filter(|t| !t.trim().is_empty());
        }
        if let Some(is_active) = patch.is_active {
            integration.is_active = is_active;
        }
        if let Some(interval) = patch.sync_interval_secs {
            integration.sync_interval_secs = interval;
        }
        if let Some(filter) = patch.filter {
            integration.filter = Some(filter);
        }
        if let Some(transform) = patch.transform {
            integration.transform = Some(transform);
        }
        integration.updated_at = Utc::now();
        validate_integration(&integration)?;

        self.store.update_integration(&integration).await?;
        self.reschedule(integration).await?;
        self.get_integration(id).await
    }

    pub async fn delete_integration(&self, id: &str) -> EngineResult<()> {
        if let Some(runtime) = &self.runtime {
            runtime.scheduler.stop(id).await;
        }
        if !self.store.delete_integration(id).await? {
            return Err(not_found("integration", id));
        }
        log::info!("[engine] Deleted integration {}", id);
        Ok(())
    }

    pub async fn get_integration(&self, id: &str) -> EngineResult<Integration> {
        self.store
            .get_integration(id)
            .await?
            .ok_or_else(|| not_found("integration", id))
    }

    pub async fn list_integrations(&self) -> EngineResult<Vec<Integration>> {
        Ok(self.store.list_integrations().await?)
    }

    /// Sync now. `None` when a sync of the same integration is already running.
    pub async fn manual_sync(&self, id: &str) -> EngineResult<Option<SyncReport>> {
        let runtime = self.runtime()?;
        let integration = self.get_integration(id).await?;
        match runtime.scheduler.manual_sync(integration).await {
            None => Ok(None),
            Some(result) => Ok(Some(result?)),
        }
    }

    pub async fn sync_status(&self, id: &str) -> Option<RunStatus> {
        match &self.runtime {
            Some(runtime) => runtime.scheduler.status(id).await,
            None => None,
        }
    }

    /// Start or stop the run and persist the planned next sync.
    /// Before `init()` a schedulable integration keeps its stored value; `init()` plans it.
    async fn reschedule(&self, integration: Integration) -> EngineResult<()> {
        let id = integration.id.clone();
        let next_sync_at = match (&self.runtime, is_schedulable(&integration)) {
            (Some(runtime), true) => Some(runtime.scheduler.start(integration).await),
            (Some(runtime), false) => {
                runtime.scheduler.stop(&id).await;
                None
            }
            (None, true) => return Ok(()),
            (None, false) => None,
        };
        self.store.set_next_sync(&id, next_sync_at).await?;
        Ok(())
    }

    fn encrypt_credentials(
        &self,
        credentials: Option<&serde_json::Value>,
    ) -> EngineResult<Option<EncryptedData>> {
        match credentials {
            Some(value) if !value.is_null() => Ok(Some(self.vault.encrypt_json(value)?)),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    pub async fn create_webhook(&self, input: NewWebhook) -> EngineResult<String> {
        if let Some(integration_id) = &input.integration_id {
            self.require_integration(integration_id).await?;
        }

        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::new_v4().to_string(),
            scope_id: input.scope_id,
            integration_id: input.integration_id,
            name: input.name.trim().to_string(),
            destination_id: input.destination_id.trim().to_string(),
            secret: self.encrypt_secret(input.secret.as_deref())?,
            events: input.events,
            is_active: true,
            limits: input.limits.unwrap_or_default(),
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        validate_webhook(&webhook)?;

        self.store.insert_webhook(&webhook).await?;
        log::info!("[engine] Created webhook {}", webhook.id);
        Ok(webhook.id)
    }

    pub async fn update_webhook(&self, id: &str, patch: WebhookPatch) -> EngineResult<Webhook> {
        let mut webhook = self.get_webhook(id).await?;

        if let Some(name) = patch.name {
            webhook.name = name.trim().to_string();
        }
        if let Some(destination_id) = patch.destination_id {
            webhook.destination_id = destination_id.trim().to_string();
        }
        if let Some(secret) = patch.secret {
            webhook.secret = self.encrypt_secret(Some(&secret))?;
        }
        if let Some(events) = patch.events {
            webhook.events = events;
        }
        if let Some(is_active) = patch.is_active {
            webhook.is_active = is_active;
        }
        if let Some(limits) = patch.limits {
            webhook.limits = limits;
        }
        webhook.updated_at = Utc::now();
        validate_webhook(&webhook)?;

        self.store.update_webhook(&webhook).await?;
        Ok(webhook)
    }

    pub async fn delete_webhook(&self, id: &str) -> EngineResult<()> {
        if !self.store.delete_webhook(id).await? {
            return Err(not_found("webhook", id));
        }
        if let Some(runtime) = &self.runtime {
            runtime.gateway.rate_limiter.forget(id);
        }
        log::info!("[engine] Deleted webhook {}", id);
        Ok(())
    }

    pub async fn get_webhook(&self, id: &str) -> EngineResult<Webhook> {
        self.store
            .get_webhook(id)
            .await?
            .ok_or_else(|| not_found("webhook", id))
    }

    pub async fn list_webhooks(&self) -> EngineResult<Vec<Webhook>> {
        Ok(self.store.list_webhooks().await?)
    }

    async fn require_integration(&self, id: &str) -> EngineResult<()> {
        match self.store.get_integration(id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::invalid(format!("linked integration {} does not exist", id))),
        }
    }

    /// Blank secrets mean "no signature required"
    fn encrypt_secret(&self, secret: Option<&str>) -> EngineResult<Option<EncryptedData>> {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Ok(Some(self.vault.encrypt(secret)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Activity
    // ========================================================================

    pub async fn activity(&self, filter: &ActivityFilter) -> EngineResult<Vec<ActivityLogEntry>> {
        Ok(self.activity.list(filter).await?)
    }
}

fn not_found(kind: &'static str, id: &str) -> EngineError {
    EngineError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Active and polling on a positive interval
fn is_schedulable(integration: &Integration) -> bool {
    integration.is_active && integration.poll_interval().is_some()
}

fn validate_integration(integration: &Integration) -> EngineResult<()> {
    if integration.name.is_empty() {
        return Err(EngineError::invalid("name must not be empty"));
    }
    if integration.destination_id.is_empty() {
        return Err(EngineError::invalid("destinationId must not be empty"));
    }
    if !integration.config.is_object() {
        return Err(EngineError::invalid("config must be an object"));
    }
    match integration.sync_interval_secs {
        Some(secs) if secs < 0 => {
            return Err(EngineError::invalid("syncIntervalSecs must be >= 0"));
        }
        Some(secs) if secs > 0 && integration.integration_type == IntegrationType::OutboundWebhook => {
            return Err(EngineError::invalid(
                "outbound_webhook integrations cannot be polled",
            ));
        }
        _ => {}
    }
    IntegrationExecutor::validate_config(integration)
        .map_err(|e| EngineError::invalid(e.to_string()))
}

fn validate_webhook(webhook: &Webhook) -> EngineResult<()> {
    if webhook.name.is_empty() {
        return Err(EngineError::invalid("name must not be empty"));
    }
    if webhook.destination_id.is_empty() {
        return Err(EngineError::invalid("destinationId must not be empty"));
    }
    if webhook.events.iter().any(|e| e.trim().is_empty()) {
        return Err(EngineError::invalid("event names must not be blank"));
    }
    let WebhookLimits {
        max_payload_bytes,
        timeout_ms,
        ..
    } = webhook.limits;
    if max_payload_bytes == 0 || timeout_ms == 0 {
        return Err(EngineError::invalid(
            "maxPayloadBytes and timeoutMs must be positive",
        ));
    }
    Ok(())
}
