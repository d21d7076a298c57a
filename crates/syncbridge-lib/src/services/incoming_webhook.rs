// Webhook Gateway
// HTTP entry point for inbound webhooks: verification, limits, subscription
// filtering and processor dispatch. Every request writes one activity entry.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::{oneshot, RwLock};
use uuid::Uuid;

use crate::models::{Webhook, WebhookLimits, WebhookTriggerResponse};
use crate::repositories::{Store, TriggerOutcome};
use crate::services::activity::{sanitize_headers, ActivityLogger, WebhookRequestRecord};
use crate::services::crypto::CredentialVault;
use crate::services::delivery::DeliverySink;
use crate::services::processors::{InboundEvent, ProcessContext, ProcessorRegistry};
use crate::services::rate_limit::RateLimiter;
use crate::services::verification::{verify_signature, SIGNATURE_HEADERS};

/// Headers consulted for the event name, in order
const EVENT_HEADERS: [&str; 3] = ["x-webhook-event", "x-github-event", "x-event-type"];

/// Headers consulted for the sender's delivery id, in order
const DELIVERY_HEADERS: [&str; 2] = ["x-delivery-id", "x-github-delivery"];

/// Fallback event name
pub const UNKNOWN_EVENT: &str = "unknown";

/// Shared state behind the gateway router
pub struct GatewayState {
    pub store: Arc<dyn Store>,
    pub vault: Arc<CredentialVault>,
    pub processors: ProcessorRegistry,
    pub sink: Arc<dyn DeliverySink>,
    pub activity: ActivityLogger,
    pub rate_limiter: RateLimiter,
    pub feed_batch_cap: usize,
    /// Hard cap applied while reading any body
    pub max_body_bytes: usize,
}

/// Build the gateway router: `POST /webhooks/{webhook_id}`
pub fn gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/webhooks/{webhook_id}", post(handle_webhook))
        .with_state(state)
}

/// How a request ended, before it is logged and returned
struct Reply {
    status: StatusCode,
    body: WebhookTriggerResponse,
    error: Option<String>,
}

impl Reply {
    fn reject(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            body: WebhookTriggerResponse {
                success: false,
                processed: false,
                delivery_id: None,
                message: message.clone(),
            },
            error: Some(message),
        }
    }

    fn ok(processed: bool, delivery_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: WebhookTriggerResponse {
                success: true,
                processed,
                delivery_id,
                message: message.into(),
            },
            error: None,
        }
    }
}

/// Request facts gathered while the pipeline runs, used for the activity entry
#[derive(Default)]
struct RequestSnapshot {
    webhook: Option<Webhook>,
    body_bytes: usize,
    payload: Option<Value>,
    event: Option<String>,
}

/// POST /webhooks/{webhook_id}
async fn handle_webhook(
    State(state): State<Arc<GatewayState>>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, Json<WebhookTriggerResponse>) {
    let started = Instant::now();
    let mut snapshot = RequestSnapshot::default();

    let run = AssertUnwindSafe(process_request(&state, &webhook_id, &headers, body, &mut snapshot))
        .catch_unwind();
    let reply = match run.await {
        Ok(reply) => reply,
        Err(_) => {
            log::error!("[gateway] Request for {} panicked", webhook_id);
            Reply::reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    };

    if reply.status.is_success() {
        log::info!(
            "[gateway] {} {} ({})",
            webhook_id,
            reply.status.as_u16(),
            reply.body.message
        );
    } else {
        log::warn!(
            "[gateway] Rejected {} with {}: {}",
            webhook_id,
            reply.status.as_u16(),
            reply.body.message
        );
    }

    let request = json!({
        "method": "POST",
        "path": format!("/webhooks/{}", webhook_id),
        "headers": sanitize_headers(&headers),
        "event": snapshot.event,
        "bodyBytes": snapshot.body_bytes,
        "body": snapshot.payload,
    });
    let response = serde_json::to_value(&reply.body).unwrap_or(Value::Null);
    state
        .activity
        .log_webhook(WebhookRequestRecord {
            webhook_id: webhook_id.clone(),
            scope_id: snapshot.webhook.as_ref().map(|w| w.scope_id.clone()),
            integration_id: snapshot.webhook.as_ref().and_then(|w| w.integration_id.clone()),
            request,
            status_code: reply.status.as_u16(),
            response,
            duration_ms: started.elapsed().as_millis() as u64,
            error: reply.error,
        })
        .await;

    (reply.status, Json(reply.body))
}

async fn process_request(
    state: &GatewayState,
    webhook_id: &str,
    headers: &HeaderMap,
    body: Body,
    snapshot: &mut RequestSnapshot,
) -> Reply {
    if Uuid::parse_str(webhook_id).is_err() {
        return Reply::reject(StatusCode::BAD_REQUEST, "Invalid webhook id");
    }

    let webhook = match state.store.get_webhook(webhook_id).await {
        Ok(Some(webhook)) if webhook.is_active => webhook,
        Ok(_) => return Reply::reject(StatusCode::NOT_FOUND, "Webhook not found or inactive"),
        Err(e) => {
            log::error!("[gateway] Failed to load webhook {}: {}", webhook_id, e);
            return Reply::reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load webhook");
        }
    };
    snapshot.webhook = Some(webhook.clone());
    let limits = webhook.limits;

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Reply::reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Body exceeds {} bytes", state.max_body_bytes),
            )
        }
    };
    snapshot.body_bytes = bytes.len();

    if let Some(encrypted) = &webhook.secret {
        let secret = match state.vault.decrypt(encrypted) {
            Ok(secret) => secret,
            Err(e) => {
                log::error!("[gateway] Cannot decrypt secret for {}: {}", webhook_id, e);
                return Reply::reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook secret could not be read",
                );
            }
        };
        let signature = SIGNATURE_HEADERS
            .iter()
            .find_map(|name| header_str(headers, name));
        match signature {
            Some(signature) if verify_signature(&secret, &bytes, signature) => {}
            Some(_) => return Reply::reject(StatusCode::UNAUTHORIZED, "Invalid signature"),
            None => return Reply::reject(StatusCode::UNAUTHORIZED, "Missing signature"),
        }
    }

    if let Err(message) = state
        .rate_limiter
        .check_and_increment(webhook_id, limits.rate_limit_per_minute)
    {
        return Reply::reject(StatusCode::TOO_MANY_REQUESTS, message);
    }

    if bytes.len() > limits.max_payload_bytes {
        return Reply::reject(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "Payload of {} bytes exceeds limit of {} bytes",
                bytes.len(),
                limits.max_payload_bytes
            ),
        );
    }

    let payload = parse_payload(&bytes);
    snapshot.payload = Some(payload.clone());
    let event = resolve_event(headers, &payload);
    snapshot.event = Some(event.clone());

    if !webhook.accepts_event(&event) {
        log::debug!("[gateway] {} not subscribed to '{}'", webhook_id, event);
        return Reply::ok(false, None, format!("Event '{}' is not subscribed", event));
    }

    let delivery_id = DELIVERY_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let reply = dispatch(state, &webhook, limits, event, delivery_id, payload).await;

    let outcome = TriggerOutcome {
        triggered_at: Utc::now(),
        error: reply.error.clone(),
    };
    if let Err(e) = state.store.record_trigger(webhook_id, &outcome).await {
        log::error!("[gateway] Failed to update counters for {}: {}", webhook_id, e);
    }
    reply
}

/// Run the resolved processor under the webhook's timeout, catching panics
async fn dispatch(
    state: &GatewayState,
    webhook: &Webhook,
    limits: WebhookLimits,
    event: String,
    delivery_id: String,
    payload: Value,
) -> Reply {
    let integration = match &webhook.integration_id {
        Some(id) => match state.store.get_integration(id).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("[gateway] Linked integration {} unavailable: {}", id, e);
                None
            }
        },
        None => None,
    };

    let inbound = InboundEvent {
        webhook_id: webhook.id.clone(),
        event,
        delivery_id: delivery_id.clone(),
        payload,
        received_at: Utc::now(),
    };
    let processor = state.processors.resolve(integration.as_ref(), &inbound);
    let ctx = ProcessContext {
        destination_id: webhook.destination_id.clone(),
        integration,
        feed_batch_cap: state.feed_batch_cap,
    };

    let run = AssertUnwindSafe(processor.process(&inbound, &ctx, state.sink.as_ref())).catch_unwind();
    let failure = match tokio::time::timeout(Duration::from_millis(limits.timeout_ms), run).await {
        Ok(Ok(Ok(outcome))) => {
            log::debug!(
                "[gateway] {} processor delivered {} message(s) for {}",
                processor.kind(),
                outcome.delivered,
                webhook.id
            );
            return Reply::ok(true, Some(delivery_id), "Webhook processed");
        }
        Ok(Ok(Err(e))) => format!("{} processor failed: {}", processor.kind(), e),
        Ok(Err(_)) => format!("{} processor panicked", processor.kind()),
        Err(_) => format!("Processing timed out after {}ms", limits.timeout_ms),
    };

    log::error!("[gateway] {} for webhook {}", failure, webhook.id);
    let mut reply = Reply::reject(StatusCode::INTERNAL_SERVER_ERROR, failure);
    reply.body.delivery_id = Some(delivery_id);
    reply
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// JSON bodies as-is, anything else as a string value
fn parse_payload(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn resolve_event(headers: &HeaderMap, payload: &Value) -> String {
    EVENT_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
        .or_else(|| {
            payload
                .get("event")
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
        })
        .unwrap_or(UNKNOWN_EVENT)
        .to_string()
}

/// Gateway Server Manager
/// Owns the listener lifecycle for a gateway router
pub struct GatewayServer {
    shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Default for GatewayServer {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayServer {
    pub fn new() -> Self {
        Self {
            shutdown_tx: RwLock::new(None),
            local_addr: RwLock::new(None),
        }
    }

    /// Bind and serve in the background. Restarts if already running.
    pub async fn start(&self, router: Router, addr: SocketAddr) -> Result<SocketAddr, String> {
        if self.is_running().await {
            self.stop().await;
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        *self.shutdown_tx.write().await = Some(shutdown_tx);
        *self.local_addr.write().await = Some(bound);

        tokio::spawn(async move {
            log::info!("[gateway] Server started on http://{}", bound);
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
            {
                log::error!("[gateway] Server error: {}", e);
            }
            log::info!("[gateway] Server stopped");
        });

        Ok(bound)
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
            log::info!("[gateway] Server shutdown requested");
        }
        *self.local_addr.write().await = None;
    }

    pub async fn is_running(&self) -> bool {
        self.local_addr.read().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityFilter, ActivityStatus, IntegrationType};
    use crate::repositories::MemoryStore;
    use crate::services::processors::{
        PayloadClassifier, ProcessOutcome, ProcessorError, ProcessorResult, WebhookProcessor,
    };
    use crate::services::verification::sign;
    use crate::test_support::{sample_integration, sample_webhook, RecordingSink};
    use async_trait::async_trait;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const SECRET: &str = "shared-secret";

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct SpyProcessor {
        calls: Arc<AtomicUsize>,
        behavior: Behavior,
    }

    #[async_trait]
    impl WebhookProcessor for SpyProcessor {
        fn kind(&self) -> &'static str {
            "spy"
        }

        async fn process(
            &self,
            _event: &InboundEvent,
            _ctx: &ProcessContext,
            _sink: &dyn DeliverySink,
        ) -> ProcessorResult<ProcessOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(ProcessOutcome { delivered: 1 }),
                Behavior::Fail => Err(ProcessorError::Internal("boom".to_string())),
                Behavior::Panic => panic!("processor exploded"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ProcessOutcome::default())
                }
            }
        }
    }

    struct Fixture {
        router: Router,
        store: Arc<MemoryStore>,
        vault: Arc<CredentialVault>,
        calls: Arc<AtomicUsize>,
    }

    struct PanickingClassifier;

    impl PayloadClassifier for PanickingClassifier {
        fn classify(&self, _event: &str, _payload: &Value) -> Option<IntegrationType> {
            panic!("classifier exploded")
        }
    }

    fn fixture(behavior: Behavior) -> Fixture {
        fixture_with(behavior, |_| {})
    }

    fn fixture_with(behavior: Behavior, customize: impl FnOnce(&mut ProcessorRegistry)) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(CredentialVault::new("gateway-test-key").unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut processors = ProcessorRegistry::with_defaults();
        processors.set_default(Arc::new(SpyProcessor {
            calls: calls.clone(),
            behavior,
        }));
        customize(&mut processors);

        let state = Arc::new(GatewayState {
            store: store.clone(),
            vault: vault.clone(),
            processors,
            sink: Arc::new(RecordingSink::default()),
            activity: ActivityLogger::new(store.clone()),
            rate_limiter: RateLimiter::default(),
            feed_batch_cap: 5,
            max_body_bytes: 64 * 1024,
        });
        Fixture {
            router: gateway_router(state),
            store,
            vault,
            calls,
        }
    }

    impl Fixture {
        async fn add_webhook(&self, configure: impl FnOnce(&mut Webhook)) -> String {
            let id = Uuid::new_v4().to_string();
            let mut webhook = sample_webhook(&id, None);
            configure(&mut webhook);
            self.store.insert_webhook(&webhook).await.unwrap();
            id
        }

        async fn add_signed_webhook(&self) -> String {
            let secret = self.vault.encrypt(SECRET).unwrap();
            self.add_webhook(|w| w.secret = Some(secret)).await
        }

        async fn send(&self, id: &str, body: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
            let mut request = Request::builder()
                .method("POST")
                .uri(format!("/webhooks/{}", id))
                .header("content-type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let response = self
                .router
                .clone()
                .oneshot(request.body(Body::from(body.to_string())).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn activity(&self) -> Vec<crate::models::ActivityLogEntry> {
            self.store.list_activity(&ActivityFilter::default()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_unsigned_webhook_dispatches() {
        let f = fixture(Behavior::Succeed);
        let id = f.add_webhook(|_| {}).await;

        let (status, body) = f
            .send(&id, r#"{"event":"order.created","n":1}"#, &[("x-delivery-id", "abc-1")])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["processed"], true);
        assert_eq!(body["deliveryId"], "abc-1");
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);

        let webhook = f.store.get_webhook(&id).await.unwrap().unwrap();
        assert_eq!(webhook.success_count, 1);
        assert!(webhook.last_triggered_at.is_some());

        let entries = f.activity().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ActivityStatus::Success);
        assert_eq!(entries[0].request.as_ref().unwrap()["event"], "order.created");
    }

    #[tokio::test]
    async fn test_signature_with_and_without_prefix() {
        let f = fixture(Behavior::Succeed);
        let id = f.add_signed_webhook().await;
        let body = r#"{"hello":"world"}"#;
        let signature = sign(SECRET, body.as_bytes());

        let (status, _) = f.send(&id, body, &[("x-webhook-signature", &signature)]).await;
        assert_eq!(status, StatusCode::OK);

        let prefixed = format!("sha256={}", signature);
        let (status, _) = f.send(&id, body, &[("x-hub-signature-256", &prefixed)]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bit_flipped_signature_is_unauthorized() {
        let f = fixture(Behavior::Succeed);
        let id = f.add_signed_webhook().await;
        let body = r#"{"hello":"world"}"#;
        let signature = sign(SECRET, body.as_bytes());

        // Flip the lowest bit of the first hex digit
        let mut flipped = signature.clone().into_bytes();
        let digit = u8::from_str_radix(&signature[..1], 16).unwrap() ^ 1;
        flipped[0] = format!("{:x}", digit).as_bytes()[0];
        let flipped = String::from_utf8(flipped).unwrap();

        let (status, body_json) = f.send(&id, body, &[("x-signature", &flipped)]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body_json["success"], false);

        let (status, _) = f.send(&id, body, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_event_skips_processor() {
        let f = fixture(Behavior::Succeed);
        let id = f.add_webhook(|w| w.events = vec!["push".to_string()]).await;

        let (status, body) = f.send(&id, "{}", &[("x-github-event", "issue")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["processed"], false);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.activity().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_inactive_and_malformed_ids() {
        let f = fixture(Behavior::Succeed);
        let inactive = f.add_webhook(|w| w.is_active = false).await;

        let (status, _) = f.send(&Uuid::new_v4().to_string(), "{}", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = f.send(&inactive, "{}", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = f.send("not-a-uuid", "{}", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let entries = f.activity().await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.status == ActivityStatus::Failed));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_payload_limit() {
        let f = fixture(Behavior::Succeed);
        let id = f
            .add_webhook(|w| {
                w.limits = WebhookLimits {
                    max_payload_bytes: 16,
                    ..WebhookLimits::default()
                }
            })
            .await;

        let (status, _) = f.send(&id, r#"{"data":"this is far too long"}"#, &[]).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        // Over the hard cap as well
        let huge = format!(r#"{{"data":"{}"}}"#, "x".repeat(70 * 1024));
        let (status, _) = f.send(&id, &huge, &[]).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        assert_eq!(f.activity().await.len(), 2);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let f = fixture(Behavior::Succeed);
        let id = f
            .add_webhook(|w| {
                w.limits = WebhookLimits {
                    rate_limit_per_minute: 2,
                    ..WebhookLimits::default()
                }
            })
            .await;

        assert_eq!(f.send(&id, "{}", &[]).await.0, StatusCode::OK);
        assert_eq!(f.send(&id, "{}", &[]).await.0, StatusCode::OK);
        assert_eq!(f.send(&id, "{}", &[]).await.0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.activity().await.len(), 3);
    }

    #[tokio::test]
    async fn test_processor_error_and_panic_return_500() {
        for behavior in [Behavior::Fail, Behavior::Panic] {
            let f = fixture(behavior);
            let id = f.add_webhook(|_| {}).await;

            let (status, body) = f.send(&id, "{}", &[]).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["success"], false);

            let webhook = f.store.get_webhook(&id).await.unwrap().unwrap();
            assert_eq!(webhook.failure_count, 1);
            assert!(webhook.last_error.is_some());

            let entries = f.activity().await;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].status, ActivityStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_panic_before_dispatch_is_logged_as_500() {
        let f = fixture_with(Behavior::Succeed, |registry| {
            registry.set_classifier(Arc::new(PanickingClassifier))
        });
        let id = f.add_webhook(|_| {}).await;

        let (status, body) = f.send(&id, r#"{"event":"order.created"}"#, &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);

        let entries = f.activity().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ActivityStatus::Failed);
        assert_eq!(entries[0].webhook_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_timeout_returns_500() {
        let f = fixture(Behavior::Hang);
        let id = f
            .add_webhook(|w| {
                w.limits = WebhookLimits {
                    timeout_ms: 50,
                    ..WebhookLimits::default()
                }
            })
            .await;

        let (status, body) = f.send(&id, "{}", &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_linked_integration_selects_processor() {
        let f = fixture(Behavior::Succeed);
        let mut integration = sample_integration("linked");
        integration.integration_type = IntegrationType::Feed;
        f.store.insert_integration(&integration).await.unwrap();
        let id = f
            .add_webhook(|w| w.integration_id = Some("linked".to_string()))
            .await;

        let (status, _) = f
            .send(&id, r#"{"items":[{"title":"A","link":"https://a.test"}]}"#, &[])
            .await;
        assert_eq!(status, StatusCode::OK);
        // Feed processor handled it, not the spy default
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sensitive_headers_not_logged() {
        let f = fixture(Behavior::Succeed);
        let id = f.add_webhook(|_| {}).await;

        f.send(
            &id,
            "plain text body",
            &[("authorization", "Bearer x"), ("x-api-key", "k"), ("x-trace", "t-1")],
        )
        .await;

        let entries = f.activity().await;
        let request = entries[0].request.as_ref().unwrap();
        let headers = request["headers"].as_object().unwrap();
        assert!(!headers.contains_key("authorization"));
        assert!(!headers.contains_key("x-api-key"));
        assert_eq!(headers["x-trace"], "t-1");
        assert_eq!(request["body"], "plain text body");
    }

    #[test]
    fn test_event_resolution_order() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_event(&headers, &json!({})), "unknown");
        assert_eq!(resolve_event(&headers, &json!({ "event": "from.body" })), "from.body");
        headers.insert("x-event-type", "typed".parse().unwrap());
        assert_eq!(resolve_event(&headers, &json!({ "event": "from.body" })), "typed");
        headers.insert("x-webhook-event", "primary".parse().unwrap());
        assert_eq!(resolve_event(&headers, &json!({})), "primary");
    }

    #[tokio::test]
    async fn test_server_start_and_stop() {
        let f = fixture(Behavior::Succeed);
        let server = GatewayServer::new();
        let addr = server
            .start(f.router.clone(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        assert!(server.is_running().await);
        assert_eq!(server.local_addr().await, Some(addr));

        server.stop().await;
        assert!(!server.is_running().await);
    }
}
