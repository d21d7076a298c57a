// Webhook Repository
// Handles all database operations for inbound webhooks

use rusqlite::{params, OptionalExtension, Row};

use super::integration_repo::{parse_json_opt, parse_time, parse_time_opt};
use super::TriggerOutcome;
use crate::models::{Webhook, WebhookLimits};
use crate::utils::database::Database;

const SELECT_COLUMNS: &str = r#"
    SELECT id, scope_id, integration_id, name, destination_id, secret, events, is_active,
           max_payload_bytes, rate_limit_per_minute, timeout_ms, success_count,
           failure_count, last_triggered_at, last_error, created_at, updated_at
    FROM webhooks
"#;

#[derive(Debug, Clone)]
pub struct WebhookRepository {
    db: Database,
}

impl WebhookRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, webhook: &Webhook) -> Result<(), String> {
        let (secret, events) = encode_columns(webhook)?;

        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO webhooks (
                    id, scope_id, integration_id, name, destination_id, secret, events, is_active,
                    max_payload_bytes, rate_limit_per_minute, timeout_ms, success_count,
                    failure_count, last_triggered_at, last_error, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
                params![
                    webhook.id,
                    webhook.scope_id,
                    webhook.integration_id,
                    webhook.name,
                    webhook.destination_id,
                    secret,
                    events,
                    webhook.is_active as i32,
                    webhook.limits.max_payload_bytes as i64,
                    webhook.limits.rate_limit_per_minute,
                    webhook.limits.timeout_ms as i64,
                    webhook.success_count as i64,
                    webhook.failure_count as i64,
                    webhook.last_triggered_at.map(|t| t.to_rfc3339()),
                    webhook.last_error,
                    webhook.created_at.to_rfc3339(),
                    webhook.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to create webhook: {}", e))?;
            Ok(())
        })
    }

    /// Write the operator-editable columns. Counters belong to `record_trigger`.
    pub fn update(&self, webhook: &Webhook) -> Result<bool, String> {
        let (secret, events) = encode_columns(webhook)?;

        self.db.with_connection(|conn| {
            let updated = conn
                .execute(
                    r#"
                    UPDATE webhooks SET
                        integration_id = ?2, name = ?3, destination_id = ?4, secret = ?5,
                        events = ?6, is_active = ?7, max_payload_bytes = ?8,
                        rate_limit_per_minute = ?9, timeout_ms = ?10, updated_at = ?11
                    WHERE id = ?1
                    "#,
                    params![
                        webhook.id,
                        webhook.integration_id,
                        webhook.name,
                        webhook.destination_id,
                        secret,
                        events,
                        webhook.is_active as i32,
                        webhook.limits.max_payload_bytes as i64,
                        webhook.limits.rate_limit_per_minute,
                        webhook.limits.timeout_ms as i64,
                        webhook.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(|e| format!("Failed to update webhook: {}", e))?;
            Ok(updated > 0)
        })
    }

    /// Apply the counters of one dispatched request
    pub fn record_trigger(&self, id: &str, outcome: &TriggerOutcome) -> Result<bool, String> {
        let triggered_at = outcome.triggered_at.to_rfc3339();

        self.db.with_connection(|conn| {
            let updated = match &outcome.error {
                None => conn.execute(
                    "UPDATE webhooks SET success_count = success_count + 1, last_triggered_at = ?2 WHERE id = ?1",
                    params![id, triggered_at],
                ),
                Some(error) => conn.execute(
                    "UPDATE webhooks SET failure_count = failure_count + 1, last_triggered_at = ?2, last_error = ?3 WHERE id = ?1",
                    params![id, triggered_at, error],
                ),
            }
            .map_err(|e| format!("Failed to record webhook trigger: {}", e))?;
            Ok(updated > 0)
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool, String> {
        self.db.with_connection(|conn| {
            let deleted = conn
                .execute("DELETE FROM webhooks WHERE id = ?1", params![id])
                .map_err(|e| format!("Failed to delete webhook: {}", e))?;
            Ok(deleted > 0)
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Webhook>, String> {
        self.db.with_connection(|conn| {
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    params![id],
                    WebhookRow::from_row,
                )
                .optional()
                .map_err(|e| format!("Failed to get webhook: {}", e))?;
            row.map(WebhookRow::into_record).transpose()
        })
    }

    pub fn list(&self) -> Result<Vec<Webhook>, String> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!("{} ORDER BY created_at", SELECT_COLUMNS))
                .map_err(|e| format!("Failed to prepare statement: {}", e))?;

            let rows = stmt
                .query_map([], WebhookRow::from_row)
                .map_err(|e| format!("Failed to query webhooks: {}", e))?;

            let mut webhooks = Vec::new();
            for row in rows {
                let row = row.map_err(|e| format!("Failed to read row: {}", e))?;
                webhooks.push(row.into_record()?);
            }
            Ok(webhooks)
        })
    }
}

fn encode_columns(webhook: &Webhook) -> Result<(Option<String>, String), String> {
    let secret = webhook
        .secret
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| format!("Failed to serialize secret: {}", e))?;
    let events = serde_json::to_string(&webhook.events)
        .map_err(|e| format!("Failed to serialize events: {}", e))?;
    Ok((secret, events))
}

struct WebhookRow {
    id: String,
    scope_id: String,
    integration_id: Option<String>,
    name: String,
    destination_id: String,
    secret: Option<String>,
    events: String,
    is_active: i32,
    max_payload_bytes: i64,
    rate_limit_per_minute: u32,
    timeout_ms: i64,
    success_count: i64,
    failure_count: i64,
    last_triggered_at: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WebhookRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scope_id: row.get(1)?,
            integration_id: row.get(2)?,
            name: row.get(3)?,
            destination_id: row.get(4)?,
            secret: row.get(5)?,
            events: row.get(6)?,
            is_active: row.get(7)?,
            max_payload_bytes: row.get(8)?,
            rate_limit_per_minute: row.get(9)?,
            timeout_ms: row.get(10)?,
            success_count: row.get(11)?,
            failure_count: row.get(12)?,
            last_triggered_at: row.get(13)?,
            last_error: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<Webhook, String> {
        let events: Vec<String> = serde_json::from_str(&self.events)
            .map_err(|e| format!("Failed to parse events: {}", e))?;

        Ok(Webhook {
            secret: parse_json_opt(self.secret.as_deref(), "secret")?,
            events,
            limits: WebhookLimits {
                max_payload_bytes: self.max_payload_bytes.max(0) as usize,
                rate_limit_per_minute: self.rate_limit_per_minute,
                timeout_ms: self.timeout_ms.max(0) as u64,
            },
            last_triggered_at: parse_time_opt(self.last_triggered_at.as_deref())?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            scope_id: self.scope_id,
            integration_id: self.integration_id,
            name: self.name,
            destination_id: self.destination_id,
            is_active: self.is_active != 0,
            success_count: self.success_count.max(0) as u64,
            failure_count: self.failure_count.max(0) as u64,
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::IntegrationRepository;
    use crate::test_support::{sample_integration, sample_webhook};
    use chrono::Utc;
    use tempfile::tempdir;

    fn setup_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, db) = setup_test_db();
        let repo = WebhookRepository::new(db);
        let mut webhook = sample_webhook("wh-1", None);
        webhook.events = vec!["push".to_string(), "issues".to_string()];
        webhook.limits.rate_limit_per_minute = 5;
        repo.create(&webhook).unwrap();

        let loaded = repo.get("wh-1").unwrap().unwrap();
        assert_eq!(loaded.events, webhook.events);
        assert_eq!(loaded.limits, webhook.limits);
        assert!(loaded.secret.is_none());
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_record_trigger() {
        let (_dir, db) = setup_test_db();
        let repo = WebhookRepository::new(db);
        repo.create(&sample_webhook("wh-1", None)).unwrap();

        let now = Utc::now();
        repo.record_trigger("wh-1", &TriggerOutcome { triggered_at: now, error: None })
            .unwrap();
        repo.record_trigger(
            "wh-1",
            &TriggerOutcome {
                triggered_at: now,
                error: Some("processor timed out".to_string()),
            },
        )
        .unwrap();

        let loaded = repo.get("wh-1").unwrap().unwrap();
        assert_eq!(loaded.success_count, 1);
        assert_eq!(loaded.failure_count, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("processor timed out"));
        assert!(loaded.last_triggered_at.is_some());
        assert!(!repo
            .record_trigger("missing", &TriggerOutcome { triggered_at: now, error: None })
            .unwrap());
    }

    #[test]
    fn test_update_keeps_counters_recorded_after_read() {
        let (_dir, db) = setup_test_db();
        let repo = WebhookRepository::new(db);
        repo.create(&sample_webhook("wh-1", None)).unwrap();
        let mut snapshot = repo.get("wh-1").unwrap().unwrap();

        repo.record_trigger("wh-1", &TriggerOutcome { triggered_at: Utc::now(), error: None })
            .unwrap();

        snapshot.events = vec!["push".to_string()];
        assert!(repo.update(&snapshot).unwrap());

        let loaded = repo.get("wh-1").unwrap().unwrap();
        assert_eq!(loaded.events, vec!["push".to_string()]);
        assert_eq!(loaded.success_count, 1);
        assert!(loaded.last_triggered_at.is_some());
    }

    #[test]
    fn test_integration_delete_unlinks() {
        let (_dir, db) = setup_test_db();
        let integrations = IntegrationRepository::new(db.clone());
        let repo = WebhookRepository::new(db);

        integrations.create(&sample_integration("int-1")).unwrap();
        repo.create(&sample_webhook("wh-1", Some("int-1"))).unwrap();

        integrations.delete("int-1").unwrap();
        let loaded = repo.get("wh-1").unwrap().unwrap();
        assert!(loaded.integration_id.is_none());
    }
}
