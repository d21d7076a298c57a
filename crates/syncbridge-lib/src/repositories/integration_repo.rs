// Integration Repository
// Handles all database operations for integrations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::SyncOutcome;
use crate::models::{Integration, IntegrationType};
use crate::utils::database::Database;

const SELECT_COLUMNS: &str = r#"
    SELECT id, scope_id, name, integration_type, provider, config, credentials,
           destination_id, message_template, is_active, sync_interval_secs,
           last_sync_at, next_sync_at, sync_count, error_count, last_error,
           filter_spec, transform_spec, created_by, created_at, updated_at
    FROM integrations
"#;

/// Repository for integration data access
#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    db: Database,
}

impl IntegrationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new integration
    pub fn create(&self, integration: &Integration) -> Result<(), String> {
        let row = IntegrationColumns::from_record(integration)?;

        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO integrations (
                    id, scope_id, name, integration_type, provider, config, credentials,
                    destination_id, message_template, is_active, sync_interval_secs,
                    last_sync_at, next_sync_at, sync_count, error_count, last_error,
                    filter_spec, transform_spec, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                "#,
                params![
                    integration.id,
                    integration.scope_id,
                    integration.name,
                    integration.integration_type.as_str(),
                    integration.provider,
                    row.config,
                    row.credentials,
                    integration.destination_id,
                    integration.message_template,
                    integration.is_active as i32,
                    integration.sync_interval_secs,
                    integration.last_sync_at.map(|t| t.to_rfc3339()),
                    integration.next_sync_at.map(|t| t.to_rfc3339()),
                    integration.sync_count as i64,
                    integration.error_count as i64,
                    integration.last_error,
                    row.filter,
                    row.transform,
                    integration.created_by,
                    integration.created_at.to_rfc3339(),
                    integration.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to create integration: {}", e))?;
            Ok(())
        })
    }

    /// Write the operator-editable columns; returns false if the row is missing.
    /// Counters and sync timestamps belong to `record_sync` and `set_next_sync`.
    pub fn update(&self, integration: &Integration) -> Result<bool, String> {
        let row = IntegrationColumns::from_record(integration)?;

        self.db.with_connection(|conn| {
            let updated = conn
                .execute(
                    r#"
                    UPDATE integrations SET
                        name = ?2, integration_type = ?3, provider = ?4, config = ?5,
                        credentials = ?6, destination_id = ?7, message_template = ?8,
                        is_active = ?9, sync_interval_secs = ?10, filter_spec = ?11,
                        transform_spec = ?12, updated_at = ?13
                    WHERE id = ?1
                    "#,
                    params![
                        integration.id,
                        integration.name,
                        integration.integration_type.as_str(),
                        integration.provider,
                        row.config,
                        row.credentials,
                        integration.destination_id,
                        integration.message_template,
                        integration.is_active as i32,
                        integration.sync_interval_secs,
                        row.filter,
                        row.transform,
                        integration.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(|e| format!("Failed to update integration: {}", e))?;
            Ok(updated > 0)
        })
    }

    pub fn set_next_sync(&self, id: &str, next_sync_at: Option<DateTime<Utc>>) -> Result<bool, String> {
        self.db.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE integrations SET next_sync_at = ?2 WHERE id = ?1",
                    params![id, next_sync_at.map(|t| t.to_rfc3339())],
                )
                .map_err(|e| format!("Failed to set next sync: {}", e))?;
            Ok(updated > 0)
        })
    }

    /// Apply the result of a sync attempt in a single statement
    pub fn record_sync(&self, id: &str, outcome: &SyncOutcome) -> Result<bool, String> {
        let completed_at = outcome.completed_at.to_rfc3339();
        let next_sync_at = outcome.next_sync_at.map(|t| t.to_rfc3339());

        self.db.with_connection(|conn| {
            let updated = match &outcome.error {
                None => conn.execute(
                    r#"
                    UPDATE integrations SET
                        sync_count = sync_count + 1,
                        last_sync_at = ?2,
                        next_sync_at = ?3,
                        updated_at = ?2
                    WHERE id = ?1
                    "#,
                    params![id, completed_at, next_sync_at],
                ),
                Some(error) => conn.execute(
                    r#"
                    UPDATE integrations SET
                        error_count = error_count + 1,
                        last_error = ?4,
                        next_sync_at = ?3,
                        updated_at = ?2
                    WHERE id = ?1
                    "#,
                    params![id, completed_at, next_sync_at, error],
                ),
            }
            .map_err(|e| format!("Failed to record sync result: {}", e))?;
            Ok(updated > 0)
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool, String> {
        self.db.with_connection(|conn| {
            let deleted = conn
                .execute("DELETE FROM integrations WHERE id = ?1", params![id])
                .map_err(|e| format!("Failed to delete integration: {}", e))?;
            Ok(deleted > 0)
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Integration>, String> {
        self.db.with_connection(|conn| {
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    params![id],
                    IntegrationRow::from_row,
                )
                .optional()
                .map_err(|e| format!("Failed to get integration: {}", e))?;
            row.map(IntegrationRow::into_record).transpose()
        })
    }

    pub fn list(&self) -> Result<Vec<Integration>, String> {
        self.db
            .with_connection(|conn| query_all(conn, &format!("{} ORDER BY created_at", SELECT_COLUMNS)))
    }
}

fn query_all(conn: &Connection, sql: &str) -> Result<Vec<Integration>, String> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| format!("Failed to prepare statement: {}", e))?;

    let rows = stmt
        .query_map([], IntegrationRow::from_row)
        .map_err(|e| format!("Failed to query integrations: {}", e))?;

    let mut integrations = Vec::new();
    for row in rows {
        let row = row.map_err(|e| format!("Failed to read row: {}", e))?;
        integrations.push(row.into_record()?);
    }
    Ok(integrations)
}

/// JSON encoded columns
struct IntegrationColumns {
    config: String,
    credentials: Option<String>,
    filter: Option<String>,
    transform: Option<String>,
}

impl IntegrationColumns {
    fn from_record(integration: &Integration) -> Result<Self, String> {
        let encode = |value: Result<String, serde_json::Error>, what: &str| {
            value.map_err(|e| format!("Failed to serialize {}: {}", what, e))
        };
        Ok(Self {
            config: encode(serde_json::to_string(&integration.config), "config")?,
            credentials: integration
                .credentials
                .as_ref()
                .map(|c| encode(serde_json::to_string(c), "credentials"))
                .transpose()?,
            filter: integration
                .filter
                .as_ref()
                .map(|f| encode(serde_json::to_string(f), "filter"))
                .transpose()?,
            transform: integration
                .transform
                .as_ref()
                .map(|t| encode(serde_json::to_string(t), "transform"))
                .transpose()?,
        })
    }
}

/// Internal row structure for mapping database rows
struct IntegrationRow {
    id: String,
    scope_id: String,
    name: String,
    integration_type: String,
    provider: Option<String>,
    config: String,
    credentials: Option<String>,
    destination_id: String,
    message_template: Option<String>,
    is_active: i32,
    sync_interval_secs: Option<i64>,
    last_sync_at: Option<String>,
    next_sync_at: Option<String>,
    sync_count: i64,
    error_count: i64,
    last_error: Option<String>,
    filter: Option<String>,
    transform: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl IntegrationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scope_id: row.get(1)?,
            name: row.get(2)?,
            integration_type: row.get(3)?,
            provider: row.get(4)?,
            config: row.get(5)?,
            credentials: row.get(6)?,
            destination_id: row.get(7)?,
            message_template: row.get(8)?,
            is_active: row.get(9)?,
            sync_interval_secs: row.get(10)?,
            last_sync_at: row.get(11)?,
            next_sync_at: row.get(12)?,
            sync_count: row.get(13)?,
            error_count: row.get(14)?,
            last_error: row.get(15)?,
            filter: row.get(16)?,
            transform: row.get(17)?,
            created_by: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    fn into_record(self) -> Result<Integration, String> {
        let integration_type = IntegrationType::parse(&self.integration_type)
            .ok_or_else(|| format!("Unknown integration type: {}", self.integration_type))?;

        Ok(Integration {
            integration_type,
            config: serde_json::from_str(&self.config)
                .map_err(|e| format!("Failed to parse config: {}", e))?,
            credentials: parse_json_opt(self.credentials.as_deref(), "credentials")?,
            filter: parse_json_opt(self.filter.as_deref(), "filter")?,
            transform: parse_json_opt(self.transform.as_deref(), "transform")?,
            last_sync_at: parse_time_opt(self.last_sync_at.as_deref())?,
            next_sync_at: parse_time_opt(self.next_sync_at.as_deref())?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            scope_id: self.scope_id,
            name: self.name,
            provider: self.provider,
            destination_id: self.destination_id,
            message_template: self.message_template,
            is_active: self.is_active != 0,
            sync_interval_secs: self.sync_interval_secs,
            sync_count: self.sync_count.max(0) as u64,
            error_count: self.error_count.max(0) as u64,
            last_error: self.last_error,
            created_by: self.created_by,
        })
    }
}

pub(crate) fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Failed to parse timestamp '{}': {}", value, e))
}

pub(crate) fn parse_time_opt(value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    value.map(parse_time).transpose()
}

pub(crate) fn parse_json_opt<T: serde::de::DeserializeOwned>(
    value: Option<&str>,
    what: &str,
) -> Result<Option<T>, String> {
    value
        .map(|json| {
            serde_json::from_str(json).map_err(|e| format!("Failed to parse {}: {}", what, e))
        })
        .transpose()
}
