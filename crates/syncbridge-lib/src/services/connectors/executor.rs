// Integration Executor
// One sync: decrypt credentials, fetch, run the pipeline, deliver

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;

use super::{ConnectorContext, ConnectorError, ConnectorRegistry, ConnectorResult};
use crate::models::{Integration, IntegrationType, SyncReport};
use crate::services::crypto::CredentialVault;
use crate::services::delivery::{format_message, DeliverySink};
use crate::services::pipeline;

/// Config key that narrows the fetched result before filtering
pub const EXTRACT_PATH_KEY: &str = "extract_path";

#[derive(Clone)]
pub struct IntegrationExecutor {
    registry: ConnectorRegistry,
    vault: Arc<CredentialVault>,
    client: Client,
    sink: Arc<dyn DeliverySink>,
    max_items_per_sync: usize,
}

impl IntegrationExecutor {
    pub fn new(
        registry: ConnectorRegistry,
        vault: Arc<CredentialVault>,
        client: Client,
        sink: Arc<dyn DeliverySink>,
        max_items_per_sync: usize,
    ) -> Self {
        Self {
            registry,
            vault,
            client,
            sink,
            max_items_per_sync,
        }
    }

    /// Check type and required config keys without touching the network
    pub fn validate(integration: &Integration) -> ConnectorResult<()> {
        if integration.integration_type == IntegrationType::OutboundWebhook {
            return Err(ConnectorError::config(
                "outbound_webhook integrations cannot be synced",
            ));
        }
        Self::validate_config(integration)
    }

    /// Required config keys for the integration's type
    pub fn validate_config(integration: &Integration) -> ConnectorResult<()> {
        for key in integration.integration_type.required_config_keys() {
            if integration.config_str(key).is_none() {
                return Err(ConnectorError::config(format!(
                    "{} integrations require config '{}'",
                    integration.integration_type, key
                )));
            }
        }
        Ok(())
    }

    pub async fn execute(&self, integration: &Integration) -> ConnectorResult<SyncReport> {
        Self::validate(integration)?;

        let connector = self.registry.get(integration.integration_type).ok_or_else(|| {
            ConnectorError::config(format!(
                "No connector registered for {}",
                integration.integration_type
            ))
        })?;

        let credentials = integration
            .credentials
            .as_ref()
            .map(|encrypted| self.vault.decrypt_json(encrypted))
            .transpose()?;
        let ctx = ConnectorContext::new(self.client.clone(), credentials);

        let fetched = connector.fetch(integration, &ctx).await?;
        let data = self.run_pipeline(integration, fetched);

        let items: Vec<&Value> = match &data {
            Value::Null => Vec::new(),
            Value::Array(values) => values.iter().take(self.max_items_per_sync).collect(),
            other => vec![other],
        };

        let mut delivered = 0;
        for item in &items {
            let message = format_message(item, integration.message_template.as_deref());
            self.sink.send(&integration.destination_id, message).await?;
            delivered += 1;
        }

        Ok(SyncReport {
            items_processed: items.len(),
            delivered,
            data,
        })
    }

    fn run_pipeline(&self, integration: &Integration, fetched: Value) -> Value {
        let mut data = match integration.config_str(EXTRACT_PATH_KEY) {
            Some(path) => pipeline::extract(&fetched, path).unwrap_or(Value::Null),
            None => fetched,
        };
        if let Some(spec) = &integration.filter {
            data = pipeline::filter(&data, spec);
        }
        if let Some(spec) = &integration.transform {
            data = pipeline::transform(&data, spec);
        }
        data
    }
}
