use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{AccessLog, TokenStore};
use crate::models::access_log::{AccessLogEntry, AccessLogRow};
use crate::models::token::{NewToken, Token, TokenStats, UsageMode};

const TOKEN_COLUMNS: &str =
    "id, token, destination_url, short_alias, expiration, usage_mode, consumed, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &NewToken) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            r#"INSERT INTO access_tokens (token, destination_url, short_alias, expiration, usage_mode, consumed, created_at)
               VALUES ($1, $2, $3, $4, $5, false, $6)
               ON CONFLICT (token) DO NOTHING
               RETURNING {}"#,
            TOKEN_COLUMNS
        ))
        .bind(&token.token)
        .bind(&token.destination_url)
        .bind(&token.short_alias)
        .bind(token.expiration)
        .bind(token.usage_mode.as_str())
        .bind(token.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn find(&self, token: &str) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM access_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    /// A single conditional UPDATE. Under READ COMMITTED a concurrent
    /// update of the same row blocks, then re-checks `consumed = false`
    /// against the committed version and matches nothing.
    async fn consume_if_unused(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            r#"UPDATE access_tokens
               SET consumed = true
               WHERE token = $1
                 AND usage_mode = 'single'
                 AND consumed = false
                 AND expiration > $2
               RETURNING {}"#,
            TOKEN_COLUMNS
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expiration < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, now: DateTime<Utc>) -> anyhow::Result<TokenStats> {
        let stats = sqlx::query_as::<_, TokenStats>(
            r#"SELECT COUNT(*) AS total,
                      COUNT(*) FILTER (
                          WHERE expiration > $1
                            AND (usage_mode = 'multiple' OR consumed = false)
                      ) AS active
               FROM access_tokens"#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AccessLog for PgStore {
    async fn append(&self, entry: &AccessLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO access_logs (token, accessed_at, ip_address, user_agent, outcome)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&entry.token)
        .bind(entry.accessed_at)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.outcome.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<AccessLogRow>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(
            r#"SELECT a.id, a.token, t.destination_url, a.accessed_at,
                      a.ip_address, a.user_agent, a.outcome
               FROM access_logs a
               LEFT JOIN access_tokens t ON t.token = a.token
               ORDER BY a.accessed_at DESC, a.id DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM access_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[derive(Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct TokenRow {
    pub id: i64,
    pub token: String,
    pub destination_url: String,
    pub short_alias: Option<String>,
    pub expiration: DateTime<Utc>,
    pub usage_mode: String,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for Token {
    type Error = anyhow::Error;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let usage_mode: UsageMode = row
            .usage_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("token {}: {}", row.id, e))?;

        Ok(Token {
            id: row.id,
            token: row.token,
            destination_url: row.destination_url,
            short_alias: row.short_alias,
            expiration: row.expiration,
            usage_mode,
            consumed: row.consumed,
            created_at: row.created_at,
        })
    }
}
