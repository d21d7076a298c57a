// Feed Processor
// Pushed feed payloads: one message per item, capped per request

use async_trait::async_trait;
use serde_json::Value;

use super::{
    InboundEvent, ProcessContext, ProcessOutcome, ProcessorError, ProcessorResult, WebhookProcessor,
};
use crate::services::delivery::{format_message, DeliverySink};

#[derive(Debug, Default, Clone, Copy)]
pub struct FeedProcessor;

fn feed_items(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .get("items")
        .or_else(|| payload.get("entries"))
        .and_then(Value::as_array)
}

#[async_trait]
impl WebhookProcessor for FeedProcessor {
    fn kind(&self) -> &'static str {
        "feed"
    }

    async fn process(
        &self,
        event: &InboundEvent,
        ctx: &ProcessContext,
        sink: &dyn DeliverySink,
    ) -> ProcessorResult<ProcessOutcome> {
        let items = feed_items(&event.payload).ok_or_else(|| {
            ProcessorError::InvalidPayload("feed payload has no items array".to_string())
        })?;

        let template = ctx.message_template();
        let mut delivered = 0;
        for item in items.iter().take(ctx.feed_batch_cap) {
            sink.send(&ctx.destination_id, format_message(item, template))
                .await?;
            delivered += 1;
        }

        if items.len() > ctx.feed_batch_cap {
            log::debug!(
                "[processor:feed] {} of {} items delivered for webhook {}",
                delivered,
                items.len(),
                event.webhook_id
            );
        }
        Ok(ProcessOutcome { delivered })
    }
}
