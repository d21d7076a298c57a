// Code Hosting Processor
// Push, pull request and issue notifications from repository webhooks

use async_trait::async_trait;
use serde_json::Value;

use super::{InboundEvent, ProcessContext, ProcessOutcome, ProcessorResult, WebhookProcessor};
use crate::models::DeliveryMessage;
use crate::services::delivery::{format_message, DeliverySink};

/// Commits listed in a push message
const MAX_LISTED_COMMITS: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct CodeHostingProcessor;

/// Which message shape to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Push,
    PullRequest,
    Issue,
    Other,
}

impl EventKind {
    fn detect(event: &str, payload: &Value) -> Self {
        match event {
            "push" => return EventKind::Push,
            "pull_request" => return EventKind::PullRequest,
            "issues" => return EventKind::Issue,
            _ => {}
        }
        if payload.get("commits").is_some_and(Value::is_array) {
            EventKind::Push
        } else if payload.get("pull_request").is_some_and(Value::is_object) {
            EventKind::PullRequest
        } else if payload.get("issue").is_some_and(Value::is_object) {
            EventKind::Issue
        } else {
            EventKind::Other
        }
    }
}

fn text<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn repo_name(payload: &Value) -> &str {
    text(payload, "/repository/full_name")
        .or_else(|| text(payload, "/repository/name"))
        .unwrap_or("repository")
}

fn sender(payload: &Value) -> &str {
    text(payload, "/sender/login")
        .or_else(|| text(payload, "/pusher/name"))
        .unwrap_or("someone")
}

fn push_message(payload: &Value) -> DeliveryMessage {
    let repo = repo_name(payload);
    let branch = text(payload, "/ref")
        .unwrap_or("")
        .trim_start_matches("refs/heads/");
    let commits = payload
        .get("commits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let lines: Vec<String> = commits
        .iter()
        .take(MAX_LISTED_COMMITS)
        .map(|commit| {
            let sha: String = text(commit, "/id").unwrap_or("").chars().take(7).collect();
            let first_line = text(commit, "/message")
                .unwrap_or("")
                .lines()
                .next()
                .unwrap_or("");
            let author = text(commit, "/author/name")
                .or_else(|| text(commit, "/author/username"))
                .unwrap_or("unknown");
            format!("`{}` {} - {}", sha, first_line, author)
        })
        .collect();

    let mut content = lines.join("\n");
    if commits.len() > MAX_LISTED_COMMITS {
        content.push_str(&format!("\n... and {} more", commits.len() - MAX_LISTED_COMMITS));
    }

    let mut message = DeliveryMessage::text(content).with_title(format!(
        "[{}] {} new commit{} to {}",
        repo,
        commits.len(),
        if commits.len() == 1 { "" } else { "s" },
        branch
    ));
    if let Some(url) = text(payload, "/compare") {
        message = message.with_url(url);
    }
    message.field("Pusher", sender(payload))
}

/// Pull requests and issues share a shape under different keys
fn item_message(payload: &Value, key: &str, label: &str) -> DeliveryMessage {
    let item = payload.get(key).unwrap_or(&Value::Null);
    let action = text(payload, "/action").unwrap_or("updated");
    let number = item
        .get("number")
        .and_then(Value::as_u64)
        .map(|n| format!(" #{}", n))
        .unwrap_or_default();
    let title = text(item, "/title").unwrap_or("");

    let body: String = text(item, "/body").unwrap_or("").chars().take(500).collect();
    let mut message = DeliveryMessage::text(body).with_title(format!(
        "[{}] {}{} {}: {}",
        repo_name(payload),
        label,
        number,
        action,
        title
    ));
    if let Some(url) = text(item, "/html_url") {
        message = message.with_url(url);
    }
    let author = text(item, "/user/login").unwrap_or_else(|| sender(payload));
    message.field("Author", author)
}

fn other_message(event: &str, payload: &Value) -> DeliveryMessage {
    DeliveryMessage::text(format!("{} by {}", event, sender(payload)))
        .with_title(format!("[{}] {}", repo_name(payload), event))
}

#[async_trait]
impl WebhookProcessor for CodeHostingProcessor {
    fn kind(&self) -> &'static str {
        "code_hosting"
    }

    async fn process(
        &self,
        event: &InboundEvent,
        ctx: &ProcessContext,
        sink: &dyn DeliverySink,
    ) -> ProcessorResult<ProcessOutcome> {
        let payload = &event.payload;
        let message = match ctx.message_template() {
            Some(template) => format_message(payload, Some(template)),
            None => match EventKind::detect(&event.event, payload) {
                EventKind::Push => push_message(payload),
                EventKind::PullRequest => item_message(payload, "pull_request", "Pull request"),
                EventKind::Issue => item_message(payload, "issue", "Issue"),
                EventKind::Other => other_message(&event.event, payload),
            },
        };

        sink.send(&ctx.destination_id, message).await?;
        Ok(ProcessOutcome { delivered: 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_integration, RecordingSink};
    use chrono::Utc;
    use serde_json::json;

    fn inbound(event: &str, payload: Value) -> InboundEvent {
        InboundEvent {
            webhook_id: "wh".to_string(),
            event: event.to_string(),
            delivery_id: "d".to_string(),
            payload,
            received_at: Utc::now(),
        }
    }

    fn ctx() -> ProcessContext {
        ProcessContext {
            destination_id: "chan".to_string(),
            integration: None,
            feed_batch_cap: 5,
        }
    }

    #[tokio::test]
    async fn test_push_message() {
        let sink = RecordingSink::default();
        let payload = json!({
            "ref": "refs/heads/main",
            "compare": "https://example.test/compare/a...b",
            "repository": { "full_name": "acme/widgets" },
            "pusher": { "name": "octocat" },
            "commits": [
                { "id": "0123456789abcdef", "message": "Fix build\n\nlong body", "author": { "name": "Octo" } },
                { "id": "fedcba9876543210", "message": "Bump deps", "author": { "username": "bot" } }
            ]
        });

        let outcome = CodeHostingProcessor
            .process(&inbound("push", payload), &ctx(), &sink)
            .await
            .unwrap();
        assert_eq!(outcome.delivered, 1);

        let (dest, message) = sink.messages().remove(0);
        assert_eq!(dest, "chan");
        assert_eq!(message.title.as_deref(), Some("[acme/widgets] 2 new commits to main"));
        assert_eq!(message.content, "`0123456` Fix build - Octo\n`fedcba9` Bump deps - bot");
        assert_eq!(message.url.as_deref(), Some("https://example.test/compare/a...b"));
        assert_eq!(message.fields[0].value, "octocat");
    }

    #[tokio::test]
    async fn test_pull_request_detected_without_event_header() {
        let sink = RecordingSink::default();
        let payload = json!({
            "action": "opened",
            "repository": { "full_name": "acme/widgets" },
            "pull_request": {
                "number": 42,
                "title": "Add gizmo",
                "html_url": "https://example.test/pull/42",
                "user": { "login": "dev" }
            }
        });

        CodeHostingProcessor
            .process(&inbound("unknown", payload), &ctx(), &sink)
            .await
            .unwrap();
        let (_, message) = sink.messages().remove(0);
        assert_eq!(
            message.title.as_deref(),
            Some("[acme/widgets] Pull request #42 opened: Add gizmo")
        );
        assert_eq!(message.fields[0].value, "dev");
    }

    #[tokio::test]
    async fn test_issue_and_other_events() {
        let sink = RecordingSink::default();
        CodeHostingProcessor
            .process(
                &inbound(
                    "issues",
                    json!({
                        "action": "closed",
                        "repository": { "name": "widgets" },
                        "issue": { "number": 7, "title": "Crash" },
                        "sender": { "login": "qa" }
                    }),
                ),
                &ctx(),
                &sink,
            )
            .await
            .unwrap();
        CodeHostingProcessor
            .process(
                &inbound("star", json!({ "repository": { "full_name": "a/b" }, "sender": { "login": "fan" } })),
                &ctx(),
                &sink,
            )
            .await
            .unwrap();

        let messages = sink.messages();
        assert_eq!(messages[0].1.title.as_deref(), Some("[widgets] Issue #7 closed: Crash"));
        assert_eq!(messages[0].1.fields[0].value, "qa");
        assert_eq!(messages[1].1.title.as_deref(), Some("[a/b] star"));
        assert_eq!(messages[1].1.content, "star by fan");
    }

    #[tokio::test]
    async fn test_template_overrides_builtin_format() {
        let sink = RecordingSink::default();
        let mut integration = sample_integration("i");
        integration.message_template = Some("{{repository.full_name}} got {{ref}}".to_string());
        let ctx = ProcessContext {
            integration: Some(integration),
            ..ctx()
        };

        CodeHostingProcessor
            .process(
                &inbound("push", json!({ "ref": "refs/heads/x", "repository": { "full_name": "a/b" }, "commits": [] })),
                &ctx,
                &sink,
            )
            .await
            .unwrap();
        assert_eq!(sink.messages()[0].1.content, "a/b got refs/heads/x");
    }
}
