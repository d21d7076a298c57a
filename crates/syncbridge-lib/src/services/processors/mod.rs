// Webhook Processors
// Turn an accepted inbound event into destination messages.
// Resolution order: linked integration type, payload classifier, default.

pub mod classifier;
pub mod code_hosting;
pub mod default;
pub mod feed;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Integration, IntegrationType};
use crate::services::delivery::{DeliveryError, DeliverySink};

pub use classifier::{HeuristicClassifier, PayloadClassifier};
pub use code_hosting::CodeHostingProcessor;
pub use default::DefaultProcessor;
pub use feed::FeedProcessor;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Processor error: {0}")]
    Internal(String),
}

impl ProcessorError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessorError::InvalidPayload(_) => "PROCESSOR_INVALID_PAYLOAD",
            ProcessorError::Delivery(_) => "PROCESSOR_DELIVERY_ERROR",
            ProcessorError::Internal(_) => "PROCESSOR_INTERNAL_ERROR",
        }
    }
}

impl From<DeliveryError> for ProcessorError {
    fn from(err: DeliveryError) -> Self {
        ProcessorError::Delivery(err.to_string())
    }
}

impl From<ProcessorError> for String {
    fn from(err: ProcessorError) -> Self {
        err.to_string()
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// An accepted inbound webhook request
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub webhook_id: String,
    /// Resolved event name, `unknown` if none was supplied
    pub event: String,
    pub delivery_id: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Everything a processor may need besides the event itself
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub destination_id: String,
    /// Linked integration, if the webhook has one
    pub integration: Option<Integration>,
    /// Upper bound on messages from one feed payload
    pub feed_batch_cap: usize,
}

impl ProcessContext {
    pub fn message_template(&self) -> Option<&str> {
        self.integration
            .as_ref()
            .and_then(|i| i.message_template.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// What a processor did with an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    pub delivered: usize,
}

#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    async fn process(
        &self,
        event: &InboundEvent,
        ctx: &ProcessContext,
        sink: &dyn DeliverySink,
    ) -> ProcessorResult<ProcessOutcome>;
}

/// Processor lookup with a swappable classifier and a default fallback
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<IntegrationType, Arc<dyn WebhookProcessor>>,
    classifier: Arc<dyn PayloadClassifier>,
    fallback: Arc<dyn WebhookProcessor>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProcessorRegistry {
    /// Built-in processors with the heuristic classifier
    pub fn with_defaults() -> Self {
        let mut processors: HashMap<IntegrationType, Arc<dyn WebhookProcessor>> = HashMap::new();
        processors.insert(IntegrationType::CodeHosting, Arc::new(CodeHostingProcessor));
        processors.insert(IntegrationType::Feed, Arc::new(FeedProcessor));
        Self {
            processors,
            classifier: Arc::new(HeuristicClassifier),
            fallback: Arc::new(DefaultProcessor),
        }
    }

    pub fn register(&mut self, ty: IntegrationType, processor: Arc<dyn WebhookProcessor>) {
        self.processors.insert(ty, processor);
    }

    pub fn set_classifier(&mut self, classifier: Arc<dyn PayloadClassifier>) {
        self.classifier = classifier;
    }

    pub fn set_default(&mut self, processor: Arc<dyn WebhookProcessor>) {
        self.fallback = processor;
    }

    /// Pick the processor for an event
    pub fn resolve(
        &self,
        linked: Option<&Integration>,
        event: &InboundEvent,
    ) -> Arc<dyn WebhookProcessor> {
        if let Some(processor) = linked.and_then(|i| self.processors.get(&i.integration_type)) {
            return processor.clone();
        }
        self.classifier
            .classify(&event.event, &event.payload)
            .and_then(|ty| self.processors.get(&ty))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
