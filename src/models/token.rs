use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many successful redirects a token allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageMode {
    #[default]
    Single,
    Multiple,
}

impl UsageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageMode::Single => "single",
            UsageMode::Multiple => "multiple",
        }
    }
}

impl fmt::Display for UsageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(UsageMode::Single),
            "multiple" => Ok(UsageMode::Multiple),
            other => Err(format!(
                "invalid usage mode '{}': expected 'single' or 'multiple'",
                other
            )),
        }
    }
}

/// An issued access token as held by the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub token: String,
    pub destination_url: String,
    pub short_alias: Option<String>,
    pub expiration: DateTime<Utc>,
    pub usage_mode: UsageMode,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Classify this token at `now` without mutating it.
    ///
    /// Expiry is checked before consumption, so a used single-use token
    /// that has also expired reports `Expired`.
    pub fn outcome_at(&self, now: DateTime<Utc>) -> Outcome {
        if self.is_expired_at(now) {
            Outcome::Expired
        } else if self.usage_mode == UsageMode::Single && self.consumed {
            Outcome::AlreadyConsumed
        } else {
            Outcome::Granted(self.destination_url.clone())
        }
    }

    /// Valid for redirect: unexpired, and either multi-use or not yet consumed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.outcome_at(now), Outcome::Granted(_))
    }
}

/// Insert payload for a new token. `consumed` always starts false.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
    pub destination_url: String,
    pub short_alias: Option<String>,
    pub expiration: DateTime<Utc>,
    pub usage_mode: UsageMode,
    pub created_at: DateTime<Utc>,
}

/// Result of validating (or consuming) a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Granted(String),
    NotFound,
    Expired,
    AlreadyConsumed,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Granted(_) => OutcomeKind::Granted,
            Outcome::NotFound => OutcomeKind::NotFound,
            Outcome::Expired => OutcomeKind::Expired,
            Outcome::AlreadyConsumed => OutcomeKind::AlreadyConsumed,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Outcome::Granted(_))
    }
}

/// Payload-free outcome label, persisted in the access log and used as a
/// metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Granted,
    NotFound,
    Expired,
    AlreadyConsumed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Granted => "granted",
            OutcomeKind::NotFound => "not_found",
            OutcomeKind::Expired => "expired",
            OutcomeKind::AlreadyConsumed => "already_consumed",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(OutcomeKind::Granted),
            "not_found" => Ok(OutcomeKind::NotFound),
            "expired" => Ok(OutcomeKind::Expired),
            "already_consumed" => Ok(OutcomeKind::AlreadyConsumed),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Aggregate counts for dashboard display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenStats {
    pub total: i64,
    pub active: i64,
}

impl TokenStats {
    /// Expired or used-up tokens that the reclaimer has not removed yet.
    pub fn inactive(&self) -> i64 {
        self.total - self.active
    }
}

/// Returned to the issuing admin after a token is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub access_url: String,
    pub short_alias: Option<String>,
    pub usage_mode: UsageMode,
    pub expiration: DateTime<Utc>,
}

/// Shortened token for logs and audit views. Never log a full token.
pub fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}
