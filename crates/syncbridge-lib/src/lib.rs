// SyncBridge Library
// Integration sync scheduling, connectors, data pipeline and webhook ingestion

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{EngineError, EngineResult};
pub use repositories::{MemoryStore, SqliteStore, Store, StoreError};
