// SQLite Schema Definitions and Migrations
// Integrations, webhooks and the activity log

use rusqlite::{params, Connection};

pub const CURRENT_VERSION: i32 = 2;

struct Migration {
    version: i32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Integrations and webhooks",
        up: r#"
            CREATE TABLE IF NOT EXISTS integrations (
                id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                name TEXT NOT NULL,
                integration_type TEXT NOT NULL CHECK(integration_type IN ('outbound_webhook', 'rest_api', 'feed', 'code_hosting', 'weather', 'custom')),
                provider TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                credentials TEXT,
                destination_id TEXT NOT NULL,
                message_template TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                sync_interval_secs INTEGER,
                last_sync_at TEXT,
                next_sync_at TEXT,
                sync_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                filter_spec TEXT,
                transform_spec TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_integrations_scope ON integrations(scope_id);
            CREATE INDEX IF NOT EXISTS idx_integrations_active ON integrations(is_active);

            CREATE TABLE IF NOT EXISTS webhooks (
                id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                integration_id TEXT REFERENCES integrations(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                destination_id TEXT NOT NULL,
                secret TEXT,
                events TEXT NOT NULL DEFAULT '["*"]',
                is_active INTEGER NOT NULL DEFAULT 1,
                max_payload_bytes INTEGER NOT NULL,
                rate_limit_per_minute INTEGER NOT NULL,
                timeout_ms INTEGER NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_triggered_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webhooks_scope ON webhooks(scope_id);
            CREATE INDEX IF NOT EXISTS idx_webhooks_integration ON webhooks(integration_id);
        "#,
    },
    Migration {
        version: 2,
        description: "Activity log",
        up: r#"
            CREATE TABLE IF NOT EXISTS activity_logs (
                id TEXT PRIMARY KEY,
                scope_id TEXT,
                integration_id TEXT,
                webhook_id TEXT,
                source TEXT NOT NULL CHECK(source IN ('sync', 'webhook')),
                status TEXT NOT NULL CHECK(status IN ('success', 'failed', 'pending', 'cancelled')),
                request TEXT,
                response TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_integration ON activity_logs(integration_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_activity_webhook ON activity_logs(webhook_id, created_at DESC);
        "#,
    },
];

/// Apply every migration newer than the recorded version.
/// Each migration and its version row commit together.
pub fn run_migrations(conn: &mut Connection) -> Result<(), String> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .map_err(|e| format!("Cannot create schema_version: {}", e))?;

    let current = get_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "[database] Applying schema v{} ({})",
            migration.version,
            migration.description
        );
        apply(conn, migration)
            .map_err(|e| format!("Schema v{} failed: {}", migration.version, e))?;
    }
    Ok(())
}

fn apply(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.up)?;
    tx.execute(
        "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.description],
    )?;
    tx.commit()
}

pub fn get_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row("SELECT IFNULL(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| format!("Cannot read schema version: {}", e))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, String> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get::<_, bool>(0),
    )
    .map_err(|e| format!("Cannot inspect sqlite_master: {}", e))
}
