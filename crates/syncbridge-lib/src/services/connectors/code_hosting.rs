// Code Hosting Connector
// Polls a repository's public event stream and normalizes each event to
// `{id, type, actor, createdAt, summary}`

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{read_json, Connector, ConnectorContext, ConnectorError, ConnectorResult};
use crate::models::{Integration, IntegrationType};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_PER_PAGE: u64 = 10;
const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Default, Clone)]
pub struct CodeHostingConnector;

impl CodeHostingConnector {
    fn repository(integration: &Integration) -> ConnectorResult<&str> {
        let repository = integration
            .config_str("repository")
            .ok_or_else(|| ConnectorError::config("repository is required"))?;
        let mut parts = repository.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(repository)
            }
            _ => Err(ConnectorError::config(format!(
                "repository must be 'owner/name', got '{}'",
                repository
            ))),
        }
    }

    fn per_page(integration: &Integration) -> u64 {
        integration
            .config
            .get("per_page")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE)
    }

    fn event_types(integration: &Integration) -> Option<Vec<String>> {
        integration
            .config
            .get("event_types")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .filter(|types: &Vec<String>| !types.is_empty())
    }
}

#[async_trait]
impl Connector for CodeHostingConnector {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::CodeHosting
    }

    async fn fetch(&self, integration: &Integration, ctx: &ConnectorContext) -> ConnectorResult<Value> {
        let repository = Self::repository(integration)?;
        let base = integration.config_str("base_url").unwrap_or(DEFAULT_API_BASE);
        let url = format!("{}/repos/{}/events", base.trim_end_matches('/'), repository);

        let mut request = ctx
            .client
            .get(&url)
            .query(&[("per_page", Self::per_page(integration))])
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = ctx.credential("token") {
            request = request.bearer_auth(token);
        }

        let raw = read_json(request.send().await?).await?;
        let events = raw.as_array().ok_or_else(|| {
            ConnectorError::Parse("Expected an array of repository events".to_string())
        })?;

        let allowed = Self::event_types(integration);
        let normalized: Vec<Value> = events
            .iter()
            .filter(|event| match &allowed {
                Some(types) => event
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| types.iter().any(|a| a == t)),
                None => true,
            })
            .map(normalize_event)
            .collect();

        log::debug!(
            "[connector:code_hosting] {} events for {}",
            normalized.len(),
            repository
        );
        Ok(Value::Array(normalized))
    }
}

fn normalize_event(event: &Value) -> Value {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("Event");
    let actor = event
        .pointer("/actor/display_login")
        .or_else(|| event.pointer("/actor/login"))
        .and_then(Value::as_str)
        .unwrap_or("someone");

    json!({
        "id": event.get("id").cloned().unwrap_or(Value::Null),
        "type": event_type,
        "actor": actor,
        "createdAt": event.get("created_at").cloned().unwrap_or(Value::Null),
        "summary": summarize(event_type, actor, event),
    })
}

/// One-line description of an event
fn summarize(event_type: &str, actor: &str, event: &Value) -> String {
    let payload = event.get("payload").unwrap_or(&Value::Null);
    let text = |pointer: &str| payload.pointer(pointer).and_then(Value::as_str).unwrap_or("");
    let number = |pointer: &str| {
        payload
            .pointer(pointer)
            .and_then(Value::as_u64)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    let repo = event.pointer("/repo/name").and_then(Value::as_str).unwrap_or("the repository");

    match event_type {
        "PushEvent" => {
            let commits = payload
                .get("size")
                .and_then(Value::as_u64)
                .or_else(|| payload.get("commits").and_then(Value::as_array).map(|c| c.len() as u64))
                .unwrap_or(0);
            let branch = text("/ref").trim_start_matches("refs/heads/");
            format!(
                "{} pushed {} commit{} to {}",
                actor,
                commits,
                if commits == 1 { "" } else { "s" },
                branch
            )
        }
        "PullRequestEvent" => format!(
            "{} {} pull request #{}: {}",
            actor,
            text("/action"),
            number("/number"),
            text("/pull_request/title")
        ),
        "IssuesEvent" => format!(
            "{} {} issue #{}: {}",
            actor,
            text("/action"),
            number("/issue/number"),
            text("/issue/title")
        ),
        "IssueCommentEvent" => format!("{} commented on #{}", actor, number("/issue/number")),
        "CreateEvent" => format!("{} created {} {}", actor, text("/ref_type"), text("/ref"))
            .trim_end()
            .to_string(),
        "DeleteEvent" => format!("{} deleted {} {}", actor, text("/ref_type"), text("/ref")),
        "ReleaseEvent" => format!(
            "{} {} release {}",
            actor,
            text("/action"),
            text("/release/tag_name")
        ),
        "WatchEvent" => format!("{} starred {}", actor, repo),
        "ForkEvent" => format!("{} forked {}", actor, repo),
        other => format!("{} triggered {}", actor, other),
    }
}
