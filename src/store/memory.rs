use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use super::{AccessLog, TokenStore};
use crate::models::access_log::{AccessLogEntry, AccessLogRow};
use crate::models::token::{NewToken, Token, TokenStats, UsageMode};

/// In-process store keyed by token value.
///
/// The conditional consume runs while holding the DashMap shard write lock
/// for that key, so check-and-set is atomic per token. Sweeps lock one shard
/// at a time and never block the whole map.
#[derive(Default)]
pub struct MemoryStore {
    tokens: DashMap<String, Token>,
    logs: RwLock<Vec<AccessLogRow>>,
    next_token_id: AtomicI64,
    next_log_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token rows currently held.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &NewToken) -> anyhow::Result<Option<Token>> {
        use dashmap::mapref::entry::Entry;

        match self.tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let row = Token {
                    id: self.next_token_id.fetch_add(1, Ordering::Relaxed) + 1,
                    token: token.token.clone(),
                    destination_url: token.destination_url.clone(),
                    short_alias: token.short_alias.clone(),
                    expiration: token.expiration,
                    usage_mode: token.usage_mode,
                    consumed: false,
                    created_at: token.created_at,
                };
                slot.insert(row.clone());
                Ok(Some(row))
            }
        }
    }

    async fn find(&self, token: &str) -> anyhow::Result<Option<Token>> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()))
    }

    async fn consume_if_unused(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Token>> {
        let Some(mut row) = self.tokens.get_mut(token) else {
            return Ok(None);
        };
        if row.usage_mode == UsageMode::Single && !row.consumed && now < row.expiration {
            row.consumed = true;
            Ok(Some(row.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut removed = 0u64;
        self.tokens.retain(|_, t| {
            let keep = t.expiration >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn stats(&self, now: DateTime<Utc>) -> anyhow::Result<TokenStats> {
        let mut stats = TokenStats::default();
        for t in self.tokens.iter() {
            stats.total += 1;
            if t.is_active_at(now) {
                stats.active += 1;
            }
        }
        Ok(stats)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AccessLog for MemoryStore {
    async fn append(&self, entry: &AccessLogEntry) -> anyhow::Result<()> {
        let row = AccessLogRow {
            id: self.next_log_id.fetch_add(1, Ordering::Relaxed) + 1,
            token: entry.token.clone(),
            destination_url: None,
            accessed_at: entry.accessed_at,
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            outcome: entry.outcome.as_str().to_string(),
        };
        self.logs.write().await.push(row);
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AccessLogRow>> {
        let logs = self.logs.read().await;
        let mut rows: Vec<AccessLogRow> = logs.clone();
        drop(logs);

        // Same ordering as the SQL backend: accessed_at DESC, id DESC.
        rows.sort_by(|a, b| {
            b.accessed_at
                .cmp(&a.accessed_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|mut row| {
                row.destination_url = self
                    .tokens
                    .get(&row.token)
                    .map(|t| t.destination_url.clone());
                row
            })
            .collect();
        Ok(page)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.logs.read().await.len() as i64)
    }
}
