// REST API Connector
// Generic HTTP source with configurable method, headers, query and auth

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use super::{read_json, require_http_url, Connector, ConnectorContext, ConnectorError, ConnectorResult};
use crate::models::{Integration, IntegrationType};

/// Header used by `api_key` auth when none is configured
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Supported authentication modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Bearer,
    ApiKey,
    Basic,
    Custom,
}

impl AuthType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "none" => Some(AuthType::None),
            "bearer" => Some(AuthType::Bearer),
            "api_key" | "apikey" => Some(AuthType::ApiKey),
            "basic" => Some(AuthType::Basic),
            "custom" => Some(AuthType::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RestApiConnector;

impl RestApiConnector {
    fn method(integration: &Integration) -> ConnectorResult<Method> {
        let raw = integration.config_str("method").unwrap_or("GET").to_uppercase();
        Method::from_bytes(raw.as_bytes())
            .map_err(|_| ConnectorError::config(format!("Invalid HTTP method: {}", raw)))
    }

    fn apply_auth(
        request: RequestBuilder,
        integration: &Integration,
        ctx: &ConnectorContext,
    ) -> ConnectorResult<RequestBuilder> {
        let raw = integration.config_str("auth_type").unwrap_or("none");
        let auth_type = AuthType::parse(raw)
            .ok_or_else(|| ConnectorError::config(format!("Unknown auth_type: {}", raw)))?;

        let missing = |what: &str| {
            ConnectorError::config(format!("auth_type '{}' requires credential '{}'", raw, what))
        };

        Ok(match auth_type {
            AuthType::None => request,
            AuthType::Bearer => {
                let token = ctx.credential("token").ok_or_else(|| missing("token"))?;
                request.bearer_auth(token)
            }
            AuthType::ApiKey => {
                let key = ctx.credential("api_key").ok_or_else(|| missing("api_key"))?;
                let header = integration
                    .config_str("api_key_header")
                    .unwrap_or(DEFAULT_API_KEY_HEADER);
                request.header(header, key)
            }
            AuthType::Basic => {
                let username = ctx.credential("username").ok_or_else(|| missing("username"))?;
                request.basic_auth(username, ctx.credential("password"))
            }
            AuthType::Custom => {
                let header = integration
                    .config_str("auth_header")
                    .ok_or_else(|| ConnectorError::config("auth_type 'custom' requires auth_header"))?;
                let value = ctx.credential("value").ok_or_else(|| missing("value"))?;
                request.header(header, value)
            }
        })
    }
}

#[async_trait]
impl Connector for RestApiConnector {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::RestApi
    }

    async fn fetch(&self, integration: &Integration, ctx: &ConnectorContext) -> ConnectorResult<Value> {
        let api_url = integration
            .config_str("api_url")
            .ok_or_else(|| ConnectorError::config("api_url is required"))?;
        let url = require_http_url(api_url, "api_url")?;
        let method = Self::method(integration)?;

        let mut request = ctx.client.request(method.clone(), url);

        if let Some(Value::Object(params)) = integration.config.get("query_params") {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), scalar_string(v)))
                .collect();
            request = request.query(&pairs);
        }

        if let Some(Value::Object(headers)) = integration.config.get("headers") {
            for (name, value) in headers {
                request = request.header(name.as_str(), scalar_string(value));
            }
        }

        request = Self::apply_auth(request, integration, ctx)?;

        let sends_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);
        if sends_body {
            match integration.config.get("body") {
                Some(Value::String(text)) => request = request.body(text.clone()),
                Some(Value::Null) | None => {}
                Some(body) => request = request.json(body),
            }
        }

        log::debug!(
            "[connector:rest_api] {} {} for integration {}",
            method,
            api_url,
            integration.id
        );

        let response = request.send().await?;
        read_json(response).await
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
