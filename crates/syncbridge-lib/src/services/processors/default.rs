// Default Processor
// Generic envelope for payloads nothing else claims

use async_trait::async_trait;

use super::{InboundEvent, ProcessContext, ProcessOutcome, ProcessorResult, WebhookProcessor};
use crate::models::DeliveryMessage;
use crate::services::delivery::{format_message, pretty_json, DeliverySink};

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProcessor;

#[async_trait]
impl WebhookProcessor for DefaultProcessor {
    fn kind(&self) -> &'static str {
        "default"
    }

    async fn process(
        &self,
        event: &InboundEvent,
        ctx: &ProcessContext,
        sink: &dyn DeliverySink,
    ) -> ProcessorResult<ProcessOutcome> {
        let message = match ctx.message_template() {
            Some(template) => format_message(&event.payload, Some(template)),
            None => DeliveryMessage::text(pretty_json(&event.payload))
                .with_title(format!("Webhook event: {}", event.event))
                .field("Delivery", event.delivery_id.clone())
                .field("Received", event.received_at.to_rfc3339()),
        };

        sink.send(&ctx.destination_id, message).await?;
        Ok(ProcessOutcome { delivered: 1 })
    }
}
