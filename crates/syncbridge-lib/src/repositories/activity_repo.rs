// Activity Repository
// Append-only activity log storage

use rusqlite::{params, types::Value as SqlValue};

use super::integration_repo::{parse_json_opt, parse_time};
use crate::models::{ActivityFilter, ActivityLogEntry, ActivitySource, ActivityStatus};
use crate::utils::database::Database;

#[derive(Debug, Clone)]
pub struct ActivityRepository {
    db: Database,
}

impl ActivityRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(&self, entry: &ActivityLogEntry) -> Result<(), String> {
        let request = entry
            .request
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| format!("Failed to serialize request: {}", e))?;
        let response = entry
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| format!("Failed to serialize response: {}", e))?;

        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO activity_logs (
                    id, scope_id, integration_id, webhook_id, source, status, request,
                    response, duration_ms, error_message, retry_count, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    entry.id,
                    entry.scope_id,
                    entry.integration_id,
                    entry.webhook_id,
                    entry.source.as_str(),
                    entry.status.as_str(),
                    request,
                    response,
                    entry.duration_ms as i64,
                    entry.error_message,
                    entry.retry_count,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to append activity: {}", e))?;
            Ok(())
        })
    }

    /// Entries matching the filter, most recent first
    pub fn list(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>, String> {
        let mut sql = String::from(
            r#"
            SELECT id, scope_id, integration_id, webhook_id, source, status, request,
                   response, duration_ms, error_message, retry_count, created_at
            FROM activity_logs
            WHERE 1 = 1
            "#,
        );
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(id) = &filter.integration_id {
            args.push(SqlValue::Text(id.clone()));
            sql.push_str(&format!(" AND integration_id = ?{}", args.len()));
        }
        if let Some(id) = &filter.webhook_id {
            args.push(SqlValue::Text(id.clone()));
            sql.push_str(&format!(" AND webhook_id = ?{}", args.len()));
        }
        if let Some(source) = filter.source {
            args.push(SqlValue::Text(source.as_str().to_string()));
            sql.push_str(&format!(" AND source = ?{}", args.len()));
        }
        // Append-only, so insertion order is chronological
        sql.push_str(" ORDER BY rowid DESC");
        if let Some(limit) = filter.limit {
            args.push(SqlValue::Integer(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", args.len()));
        }

        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| format!("Failed to prepare statement: {}", e))?;

            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                    Ok(ActivityRow {
                        id: row.get(0)?,
                        scope_id: row.get(1)?,
                        integration_id: row.get(2)?,
                        webhook_id: row.get(3)?,
                        source: row.get(4)?,
                        status: row.get(5)?,
                        request: row.get(6)?,
                        response: row.get(7)?,
                        duration_ms: row.get(8)?,
                        error_message: row.get(9)?,
                        retry_count: row.get(10)?,
                        created_at: row.get(11)?,
                    })
                })
                .map_err(|e| format!("Failed to query activity: {}", e))?;

            let mut entries = Vec::new();
            for row in rows {
                let row = row.map_err(|e| format!("Failed to read row: {}", e))?;
                entries.push(row.into_record()?);
            }
            Ok(entries)
        })
    }
}

struct ActivityRow {
    id: String,
    scope_id: Option<String>,
    integration_id: Option<String>,
    webhook_id: Option<String>,
    source: String,
    status: String,
    request: Option<String>,
    response: Option<String>,
    duration_ms: i64,
    error_message: Option<String>,
    retry_count: u32,
    created_at: String,
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityLogEntry, String> {
        Ok(ActivityLogEntry {
            source: ActivitySource::parse(&self.source)
                .ok_or_else(|| format!("Unknown activity source: {}", self.source))?,
            status: ActivityStatus::parse(&self.status)
                .ok_or_else(|| format!("Unknown activity status: {}", self.status))?,
            request: parse_json_opt(self.request.as_deref(), "request")?,
            response: parse_json_opt(self.response.as_deref(), "response")?,
            created_at: parse_time(&self.created_at)?,
            id: self.id,
            scope_id: self.scope_id,
            integration_id: self.integration_id,
            webhook_id: self.webhook_id,
            duration_ms: self.duration_ms.max(0) as u64,
            error_message: self.error_message,
            retry_count: self.retry_count,
        })
    }
}
