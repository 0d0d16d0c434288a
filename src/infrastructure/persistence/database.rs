//! SQL database wrapper.
//!
//! Both SQL backends run through sqlx's `Any` driver with one shared SQL
//! dialect: text keys, text-encoded fixed-width RFC 3339 timestamps, JSON
//! documents as text. The backend flag only changes connection setup and
//! the Postgres advisory lock used by the migration runner.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::domain::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBackend {
    Sqlite,
    Postgres,
}

#[derive(Clone)]
pub struct Database {
    pub pool: AnyPool,
    pub backend: SqlBackend,
}

impl Database {
    pub async fn connect_sqlite(path: &str) -> Result<Self> {
        install_default_drivers();

        let file = Path::new(path);
        if let Some(parent) = file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let url = format!("sqlite://{path}?mode=rwc");
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("Failed to connect to SQLite database")?;

        // Better concurrency for mixed read/write load.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .context("Failed to enable WAL mode")?;

        info!("Connected to SQLite database at {path}");
        Ok(Self {
            pool,
            backend: SqlBackend::Sqlite,
        })
    }

    pub async fn connect_postgres(dsn: &str) -> Result<Self> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .context("Failed to connect to Postgres database")?;
        info!("Connected to Postgres database");
        Ok(Self {
            pool,
            backend: SqlBackend::Postgres,
        })
    }

    pub fn is_postgres(&self) -> bool {
        self.backend == SqlBackend::Postgres
    }
}

/// Fixed-width timestamp encoding (microseconds, Z suffix): sortable as
/// text, identical across backends.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::backend(format!("bad timestamp '{raw}': {e}")))
}

pub fn encode_json(value: &serde_json::Value) -> String {
    value.to_string()
}

pub fn decode_json(raw: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(StoreError::Serialization)
}
