//! Persistence for tokens and the access log.
//!
//! Both backends implement the same two traits. All token mutation goes
//! through `TokenStore::consume_if_unused`, which is a single atomic
//! conditional update in every backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{Config, StoreBackend};
use crate::models::access_log::{AccessLogEntry, AccessLogRow};
use crate::models::token::{NewToken, Token, TokenStats};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new token. Returns `None` if the token value is already taken.
    async fn insert(&self, token: &NewToken) -> anyhow::Result<Option<Token>>;

    async fn find(&self, token: &str) -> anyhow::Result<Option<Token>>;

    /// Atomically flip `consumed` false→true for an unexpired single-use
    /// token. Returns the updated row only if this call performed the flip.
    async fn consume_if_unused(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Token>>;

    /// Delete every token with `expiration < now`. Returns rows removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn stats(&self, now: DateTime<Utc>) -> anyhow::Result<TokenStats>;

    /// Cheap round-trip used by the readiness probe.
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AccessLog: Send + Sync {
    async fn append(&self, entry: &AccessLogEntry) -> anyhow::Result<()>;

    /// Newest first, left-joined with the token table.
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AccessLogRow>>;

    async fn count(&self) -> anyhow::Result<i64>;
}

/// Open the backend selected by the config. Postgres migrations run here.
pub async fn open(cfg: &Config) -> anyhow::Result<(Arc<dyn TokenStore>, Arc<dyn AccessLog>)> {
    match cfg.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db = Arc::new(postgres::PgStore::connect(&cfg.database_url).await?);

            tracing::info!("Running migrations...");
            db.migrate().await?;

            let tokens: Arc<dyn TokenStore> = db.clone();
            let access_log: Arc<dyn AccessLog> = db;
            Ok((tokens, access_log))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; tokens will not survive a restart");
            let mem = Arc::new(memory::MemoryStore::new());
            let tokens: Arc<dyn TokenStore> = mem.clone();
            let access_log: Arc<dyn AccessLog> = mem;
            Ok((tokens, access_log))
        }
    }
}
