// SQLite Database
// One shared connection for the integration, webhook and activity repositories

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use super::schema;

/// Default database file name
pub const DATABASE_FILE: &str = "syncbridge.db";

const PRAGMAS: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA busy_timeout=5000;
    PRAGMA foreign_keys=ON;
"#;

/// Cloneable handle; every clone shares the same connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open or create the file, configure WAL and bring the schema up to date
    pub fn new(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Cannot create {}: {}", dir.display(), e))?;
        }

        let mut conn = Connection::open(&path)
            .map_err(|e| format!("Cannot open {}: {}", path.display(), e))?;
        conn.execute_batch(PRAGMAS)
            .map_err(|e| format!("Cannot configure {}: {}", path.display(), e))?;
        schema::run_migrations(&mut conn)?;

        log::debug!("[database] Opened {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, String> {
        self.conn
            .lock()
            .map_err(|_| "database connection mutex is poisoned".to_string())
    }

    /// Run `f` against the shared connection
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Connection) -> Result<T, String>,
    {
        f(&*self.connection()?)
    }

    pub fn schema_version(&self) -> Result<i32, String> {
        self.with_connection(schema::get_version)
    }
}
