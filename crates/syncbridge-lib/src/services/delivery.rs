// Delivery
// Destination-facing sink abstraction and message formatting

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::models::DeliveryMessage;
use crate::services::pipeline::render_template;

/// Placeholder replaced by the destination id in `HttpSink` URL templates
pub const DESTINATION_PLACEHOLDER: &str = "{destination}";

/// Upper bound for pretty-printed JSON content
const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Destination rejected message with status {status}")]
    Rejected { status: u16 },

    #[error("Delivery request failed: {0}")]
    Transport(String),

    #[error("Invalid sink configuration: {0}")]
    Configuration(String),
}

impl DeliveryError {
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Rejected { .. } => "DELIVERY_REJECTED",
            DeliveryError::Transport(_) => "DELIVERY_TRANSPORT_ERROR",
            DeliveryError::Configuration(_) => "DELIVERY_CONFIG_ERROR",
        }
    }
}

impl From<DeliveryError> for String {
    fn from(err: DeliveryError) -> Self {
        err.to_string()
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Destination messaging surface supplied by the host
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, destination_id: &str, message: DeliveryMessage) -> DeliveryResult<()>;
}

/// Build a message from a pipeline value.
///
/// A template wins when present. Otherwise strings pass through, feed-like
/// objects map to title/url/content, weather readings get a short summary,
/// code-hosting events use their summary line and anything else is
/// pretty-printed JSON.
pub fn format_message(value: &Value, template: Option<&str>) -> DeliveryMessage {
    if let Some(template) = template.filter(|t| !t.trim().is_empty()) {
        return DeliveryMessage::text(render_template(template, value));
    }

    match value {
        Value::String(s) => DeliveryMessage::text(s.clone()),
        Value::Object(map) if map.contains_key("temperatureC") => format_weather(value),
        Value::Object(map) if map.contains_key("title") || map.contains_key("link") => {
            let content = str_field(value, "summary")
                .or_else(|| str_field(value, "description"))
                .unwrap_or_default()
                .to_string();
            let mut message = DeliveryMessage::text(content);
            if let Some(title) = str_field(value, "title") {
                message = message.with_title(title);
            }
            if let Some(link) = str_field(value, "link").or_else(|| str_field(value, "url")) {
                message = message.with_url(link);
            }
            message
        }
        Value::Object(map) if map.contains_key("summary") && map.contains_key("type") => {
            let mut message = DeliveryMessage::text(str_field(value, "summary").unwrap_or_default());
            if let Some(actor) = str_field(value, "actor") {
                message = message.field("actor", actor);
            }
            message
        }
        Value::Number(_) | Value::Bool(_) => DeliveryMessage::text(value.to_string()),
        _ => DeliveryMessage::text(pretty_json(value)),
    }
}

fn format_weather(value: &Value) -> DeliveryMessage {
    let location = str_field(value, "location").unwrap_or("Weather");
    let description = str_field(value, "description").unwrap_or("unknown");
    let temperature = value.get("temperatureC").and_then(Value::as_f64);

    let content = match temperature {
        Some(t) => format!("{}: {}, {:.1}°C", location, description, t),
        None => format!("{}: {}", location, description),
    };

    let mut message = DeliveryMessage::text(content).with_title(location);
    if let Some(feels) = value.get("feelsLikeC").and_then(Value::as_f64) {
        message = message.field("Feels like", format!("{:.1}°C", feels));
    }
    if let Some(humidity) = value.get("humidity").and_then(Value::as_f64) {
        message = message.field("Humidity", format!("{}%", humidity));
    }
    if let Some(wind) = value.get("windSpeedKmh").and_then(Value::as_f64) {
        let direction = str_field(value, "windDirection").unwrap_or("");
        message = message.field("Wind", format!("{:.1} km/h {}", wind, direction).trim_end().to_string());
    }
    message
}

fn str_field<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Pretty JSON clipped to a size destinations accept
pub fn pretty_json(value: &Value) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if text.chars().count() > MAX_CONTENT_CHARS {
        let clipped: String = text.chars().take(MAX_CONTENT_CHARS).collect();
        format!("{}\n... (truncated)", clipped)
    } else {
        text
    }
}

/// Sink that only logs; used when no destination endpoint is configured
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn send(&self, destination_id: &str, message: DeliveryMessage) -> DeliveryResult<()> {
        log::info!(
            "[delivery] -> {}: {}{}",
            destination_id,
            message
                .title
                .as_deref()
                .map(|t| format!("[{}] ", t))
                .unwrap_or_default(),
            message.content
        );
        Ok(())
    }
}

/// Sink that POSTs `{ destinationId, message }` as JSON to a URL template
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url_template: String,
}

impl HttpSink {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> DeliveryResult<Self> {
        let url_template = url_template.into();
        // Validate with a sample destination so bad templates fail at startup
        let sample = url_template.replace(DESTINATION_PLACEHOLDER, "destination");
        url::Url::parse(&sample)
            .map_err(|e| DeliveryError::Configuration(format!("Invalid sink URL: {}", e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template,
        })
    }

    fn url_for(&self, destination_id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(destination_id.as_bytes()).collect();
        self.url_template.replace(DESTINATION_PLACEHOLDER, &encoded)
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn send(&self, destination_id: &str, message: DeliveryMessage) -> DeliveryResult<()> {
        let body = serde_json::json!({
            "destinationId": destination_id,
            "message": message,
        });

        let response = self
            .client
            .post(self.url_for(destination_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_template_wins() {
        let value = json!({ "title": "Release", "version": "1.2" });
        let message = format_message(&value, Some("New {{title}} v{{version}}"));
        assert_eq!(message.content, "New Release v1.2");
        assert!(message.title.is_none());
    }

    #[test]
    fn test_blank_template_is_ignored() {
        let message = format_message(&json!("plain"), Some("   "));
        assert_eq!(message.content, "plain");
    }

    #[test]
    fn test_feed_entry_mapping() {
        let value = json!({ "title": "Post", "link": "https://example.com/p", "summary": "Body" });
        let message = format_message(&value, None);
        assert_eq!(message.title.as_deref(), Some("Post"));
        assert_eq!(message.url.as_deref(), Some("https://example.com/p"));
        assert_eq!(message.content, "Body");
    }

    #[test]
    fn test_weather_summary() {
        let value = json!({
            "temperatureC": 21.4,
            "feelsLikeC": 20.0,
            "humidity": 40,
            "windSpeedKmh": 12.0,
            "windDirection": "NE",
            "description": "partly cloudy",
            "conditionCode": "partly_cloudy",
            "location": "Berlin"
        });
        let message = format_message(&value, None);
        assert_eq!(message.content, "Berlin: partly cloudy, 21.4°C");
        assert_eq!(message.fields.len(), 3);
        assert_eq!(message.fields[2].value, "12.0 km/h NE");
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(format_message(&json!(5), None).content, "5");
        let message = format_message(&json!({ "a": 1 }), None);
        assert_eq!(message.content, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_pretty_json_is_clipped() {
        let big = json!({ "data": "x".repeat(MAX_CONTENT_CHARS * 2) });
        assert!(pretty_json(&big).ends_with("... (truncated)"));
    }

    #[test]
    fn test_http_sink_rejects_bad_template() {
        let result = HttpSink::new("not a url/{destination}", Duration::from_secs(1));
        assert!(matches!(result, Err(DeliveryError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_http_sink_posts_json() {
        let received: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::default();
        let captured = received.clone();
        let app = Router::new()
            .route(
                "/deliver/{destination}",
                post(move |Path(dest): Path<String>, Json(body): Json<serde_json::Value>| {
                    let captured = captured.clone();
                    async move {
                        captured.lock().unwrap().push((dest, body));
                        StatusCode::NO_CONTENT
                    }
                }),
            )
            .route("/fail/{destination}", post(|| async { StatusCode::BAD_GATEWAY }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let sink = HttpSink::new(
            format!("http://{}/deliver/{{destination}}", addr),
            Duration::from_secs(5),
        )
        .unwrap();
        sink.send("channel-1", DeliveryMessage::text("hi")).await.unwrap();

        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "channel-1");
        assert_eq!(received[0].1["destinationId"], "channel-1");
        assert_eq!(received[0].1["message"]["content"], "hi");

        let failing = HttpSink::new(
            format!("http://{}/fail/{{destination}}", addr),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = failing.send("c", DeliveryMessage::text("x")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 502 }));
    }
}
