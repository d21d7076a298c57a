// Connector Executors
// Per-type strategies that fetch an integration's source and return a
// normalized JSON result

pub mod code_hosting;
pub mod error;
pub mod executor;
pub mod feed;
pub mod rest_api;
pub mod weather;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::models::{Integration, IntegrationType};

pub use code_hosting::CodeHostingConnector;
pub use error::{ConnectorError, ConnectorResult};
pub use executor::IntegrationExecutor;
pub use feed::FeedConnector;
pub use rest_api::RestApiConnector;
pub use weather::WeatherConnector;

/// Longest response snippet carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// Shared resources handed to a connector for one fetch
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    /// Client with the engine-wide request timeout
    pub client: Client,
    /// Decrypted credential object, if the integration has one
    pub credentials: Option<Value>,
}

impl ConnectorContext {
    pub fn new(client: Client, credentials: Option<Value>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Non-empty string credential
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .as_ref()
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Trait for connector executors
#[async_trait]
pub trait Connector: Send + Sync {
    /// Integration type this connector handles by default
    fn integration_type(&self) -> IntegrationType;

    /// Fetch the source and return the normalized result
    async fn fetch(&self, integration: &Integration, ctx: &ConnectorContext) -> ConnectorResult<Value>;
}

/// Maps integration types to connectors
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<IntegrationType, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in connectors; `custom` reuses the REST connector
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FeedConnector));
        registry.register(Arc::new(RestApiConnector));
        registry.register(Arc::new(WeatherConnector));
        registry.register(Arc::new(CodeHostingConnector));
        registry.register_for(IntegrationType::Custom, Arc::new(RestApiConnector));
        registry
    }

    /// Register under the connector's own type, replacing any previous one
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let ty = connector.integration_type();
        self.connectors.insert(ty, connector);
    }

    pub fn register_for(&mut self, ty: IntegrationType, connector: Arc<dyn Connector>) {
        self.connectors.insert(ty, connector);
    }

    pub fn get(&self, ty: IntegrationType) -> Option<Arc<dyn Connector>> {
        self.connectors.get(&ty).cloned()
    }
}

/// Build the shared HTTP client
pub fn build_client(timeout: std::time::Duration) -> ConnectorResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("syncbridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConnectorError::config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success status to the matching error class
pub(crate) async fn ensure_success(response: Response) -> ConnectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ConnectorError::Authentication(
            format!("Remote returned {}: {}", status, snippet),
        )),
        _ => Err(ConnectorError::Network(format!(
            "Remote returned {}: {}",
            status, snippet
        ))),
    }
}

/// Read a successful response as JSON, wrapping non-JSON text as `{"message": ...}`
pub(crate) async fn read_json(response: Response) -> ConnectorResult<Value> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    Ok(parse_body(&text))
}

pub(crate) fn parse_body(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => serde_json::json!({ "message": text }),
    }
}

/// Accept only absolute http(s) URLs
pub(crate) fn require_http_url(raw: &str, key: &str) -> ConnectorResult<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConnectorError::config(format!("Invalid {} '{}': {}", key, raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ConnectorError::config(format!(
            "Unsupported {} scheme '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_pollable_types() {
        let registry = ConnectorRegistry::with_defaults();
        for ty in [
            IntegrationType::Feed,
            IntegrationType::RestApi,
            IntegrationType::Weather,
            IntegrationType::CodeHosting,
            IntegrationType::Custom,
        ] {
            assert!(registry.get(ty).is_some(), "missing connector for {}", ty);
        }
        assert!(registry.get(IntegrationType::OutboundWebhook).is_none());
    }

    #[test]
    fn test_parse_body_wraps_text() {
        assert_eq!(parse_body("{\"a\":1}")["a"], 1);
        assert_eq!(parse_body("pong")["message"], "pong");
    }

    #[test]
    fn test_require_http_url() {
        assert!(require_http_url("https://example.com/feed", "feed_url").is_ok());
        assert!(require_http_url("ftp://example.com", "feed_url").is_err());
        assert!(require_http_url("example.com", "feed_url").is_err());
    }

    #[test]
    fn test_credential_lookup() {
        let ctx = ConnectorContext::new(
            Client::new(),
            Some(serde_json::json!({ "token": "abc", "empty": "" })),
        );
        assert_eq!(ctx.credential("token"), Some("abc"));
        assert_eq!(ctx.credential("empty"), None);
        assert_eq!(ctx.credential("missing"), None);
    }
}
