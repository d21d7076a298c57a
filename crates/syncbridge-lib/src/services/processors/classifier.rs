// Payload Classifier
// Guesses the integration type of an unlinked webhook payload from its shape

use serde_json::Value;

use crate::models::IntegrationType;

/// Strategy used only after explicit resolution failed
pub trait PayloadClassifier: Send + Sync {
    fn classify(&self, event: &str, payload: &Value) -> Option<IntegrationType>;
}

/// Shape-marker sniffing
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    fn looks_like_code_hosting(event: &str, payload: &Value) -> bool {
        if !payload.get("repository").is_some_and(Value::is_object) {
            return false;
        }
        let has = |key: &str| payload.get(key).is_some_and(|v| !v.is_null());
        has("commits")
            || has("pull_request")
            || has("issue")
            || matches!(event, "push" | "pull_request" | "issues")
    }

    fn looks_like_feed(payload: &Value) -> bool {
        payload
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .is_some_and(|first| first.get("title").is_some() && first.get("link").is_some())
    }
}

impl PayloadClassifier for HeuristicClassifier {
    fn classify(&self, event: &str, payload: &Value) -> Option<IntegrationType> {
        if Self::looks_like_code_hosting(event, payload) {
            Some(IntegrationType::CodeHosting)
        } else if Self::looks_like_feed(payload) {
            Some(IntegrationType::Feed)
        } else {
            None
        }
    }
}
