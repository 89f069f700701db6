//! Token issuance, validation and atomic consumption.

use std::sync::Arc;

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::AppError;
use crate::metrics::Metrics;
use crate::models::token::{
    token_prefix, IssuedToken, NewToken, Outcome, TokenStats, UsageMode,
};
use crate::store::TokenStore;

/// Upper bound on requested lifetime: one year.
pub const MAX_TTL_HOURS: i64 = 24 * 365;

/// Hex length of every issued token (16 random bytes).
pub const TOKEN_LEN: usize = 32;

/// Attempts to find an unused token value before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Length of the short alias path segment, taken from the token.
const SHORT_ALIAS_LEN: usize = 8;

pub struct TokenService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    base_url: String,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
            base_url: base_url.into(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Bearer-facing URL for a token.
    pub fn access_url(&self, token: &str) -> String {
        format!("{}/?access=true&token={}", self.base_url, token)
    }

    fn short_alias(&self, token: &str) -> String {
        let end = token.len().min(SHORT_ALIAS_LEN);
        format!("{}/l/{}", self.base_url, &token[..end])
    }

    /// Create a token for `destination_url` valid for `ttl_hours` from now.
    pub async fn issue(
        &self,
        destination_url: &str,
        usage_mode: UsageMode,
        ttl_hours: i64,
    ) -> Result<IssuedToken, AppError> {
        let destination = validate_destination(destination_url)?;
        if ttl_hours <= 0 || ttl_hours > MAX_TTL_HOURS {
            return Err(AppError::Validation(format!(
                "ttl_hours must be between 1 and {}, got {}",
                MAX_TTL_HOURS, ttl_hours
            )));
        }

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let token = generate_token();
            let now = self.clock.now();
            let new_token = NewToken {
                short_alias: Some(self.short_alias(&token)),
                token,
                destination_url: destination.clone(),
                expiration: now + Duration::hours(ttl_hours),
                usage_mode,
                created_at: now,
            };

            match self.store.insert(&new_token).await? {
                Some(row) => {
                    info!(
                        token = %token_prefix(&row.token),
                        usage_mode = %row.usage_mode,
                        expiration = %row.expiration,
                        "issued access token"
                    );
                    self.metrics.record_issued(row.usage_mode);
                    return Ok(IssuedToken {
                        access_url: self.access_url(&row.token),
                        token: row.token,
                        short_alias: row.short_alias,
                        usage_mode: row.usage_mode,
                        expiration: row.expiration,
                    });
                }
                None => warn!(attempt, "token value collision, regenerating"),
            }
        }

        Err(AppError::StoreUnavailable(anyhow::anyhow!(
            "no unique token after {} attempts",
            MAX_ISSUE_ATTEMPTS
        )))
    }

    /// Read-only classification. Never marks a token as consumed.
    pub async fn validate(&self, token: &str) -> Result<Outcome, AppError> {
        if !is_well_formed(token) {
            return Ok(Outcome::NotFound);
        }
        let now = self.clock.now();
        Ok(match self.store.find(token).await? {
            Some(row) => row.outcome_at(now),
            None => Outcome::NotFound,
        })
    }

    /// Validate and, for single-use tokens, consume in one atomic step.
    ///
    /// Of any number of concurrent calls with the same unused single-use
    /// token, exactly one returns `Granted`.
    pub async fn consume(&self, token: &str) -> Result<Outcome, AppError> {
        if !is_well_formed(token) {
            return Ok(Outcome::NotFound);
        }

        let now = self.clock.now();
        let Some(row) = self.store.find(token).await? else {
            return Ok(Outcome::NotFound);
        };

        if row.usage_mode == UsageMode::Multiple {
            return Ok(row.outcome_at(now));
        }

        if let Some(claimed) = self.store.consume_if_unused(token, now).await? {
            return Ok(Outcome::Granted(claimed.destination_url));
        }

        // The flip did not happen here. Re-read only to report why; a
        // single-use token can never be granted on this path.
        let outcome = match self.store.find(token).await? {
            None => Outcome::NotFound,
            Some(current) => match current.outcome_at(now) {
                Outcome::Granted(_) => Outcome::AlreadyConsumed,
                denied => denied,
            },
        };
        debug!(token = %token_prefix(token), outcome = %outcome.kind(), "single-use claim refused");
        Ok(outcome)
    }

    /// Delete tokens that expired before the current time.
    pub async fn sweep(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let deleted = self.store.delete_expired(now).await?;
        self.metrics.record_reclaimed(deleted);
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<TokenStats, AppError> {
        let now = self.clock.now();
        Ok(self.store.stats(now).await?)
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        Ok(self.store.ping().await?)
    }
}

/// 16 bytes from the OS CSPRNG, hex encoded (32 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// True if `token` could have come from `generate_token`. Anything else is
/// answered as not found without a store round trip.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Accept only absolute http(s) URLs with a host. Returns the normalized form.
pub fn validate_destination(raw: &str) -> Result<String, AppError> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| AppError::Validation(format!("invalid destination_url: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(format!(
            "destination_url scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppError::Validation(
            "destination_url must include a host".to_string(),
        ));
    }
    Ok(url.to_string())
}
