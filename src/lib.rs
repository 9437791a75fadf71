//! Profile entity service
//!
//! Typed, field-carrying profiles owned by accounts: a registry of profile
//! types, per-type field schemas, a profile store that follows its owners'
//! lifecycle and an adapter that embeds profile forms into registration.

pub mod api;
pub mod app;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod storage;

use anyhow::Result;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::{Settings, StorageBackend};
use crate::storage::{MemoryStorage, PgStorage, Storage};

/// Opens the configured storage backend, running migrations if enabled.
pub async fn open_storage(settings: &Settings) -> Result<Arc<dyn Storage>> {
    match settings.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::Postgres => {
            let pool = db::create_pool(settings).await?;
            if settings.run_migrations {
                db::run_migrations(&pool).await?;
            }
            Ok(Arc::new(PgStorage::new(pool)))
        }
    }
}

/// Services against the given storage, using the system clock.
pub fn build_services(storage: Arc<dyn Storage>) -> Arc<services::ProfileServices> {
    Arc::new(services::ProfileServices::new(storage, Arc::new(SystemClock)))
}
