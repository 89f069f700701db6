use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::{token_prefix, OutcomeKind};

/// Maximum stored length of a presented token. Bearers can send anything.
pub const MAX_LOGGED_TOKEN_LEN: usize = 255;

/// One access attempt, written once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub token: String,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: OutcomeKind,
}

impl AccessLogEntry {
    pub fn new(
        token: &str,
        accessed_at: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        outcome: OutcomeKind,
    ) -> Self {
        Self {
            token: token
                .chars()
                .filter(|c| *c != '\0')
                .take(MAX_LOGGED_TOKEN_LEN)
                .collect(),
            accessed_at,
            ip_address: ip_address.map(|ip| ip.chars().take(45).collect()),
            user_agent: user_agent.map(String::from),
            outcome,
        }
    }
}

/// Access log entry joined with its token row, if the token still exists.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessLogRow {
    pub id: i64,
    pub token: String,
    pub destination_url: Option<String>,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: String,
}

/// What the log viewer shows per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditView {
    pub token_prefix: String,
    pub destination_url: Option<String>,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub outcome: String,
}

impl From<AccessLogRow> for AuditView {
    fn from(row: AccessLogRow) -> Self {
        Self {
            token_prefix: token_prefix(&row.token),
            destination_url: row.destination_url,
            accessed_at: row.accessed_at,
            ip_address: row.ip_address,
            outcome: row.outcome,
        }
    }
}

/// A page of the audit log, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditView>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}
