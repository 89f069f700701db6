//! Maps a presented token to a redirect decision.
//!
//! Every attempt is written to the access log with its real outcome, but
//! the bearer only ever learns "redirect to destination" or "redirect to
//! the denial target".

use std::sync::Arc;

use tracing::{error, info};

use crate::errors::AppError;
use crate::metrics::Metrics;
use crate::models::access_log::AccessLogEntry;
use crate::models::token::{token_prefix, Outcome};
use crate::service::TokenService;
use crate::store::AccessLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Redirect(String),
    Deny(String),
}

impl AccessDecision {
    pub fn location(&self) -> &str {
        match self {
            AccessDecision::Redirect(url) | AccessDecision::Deny(url) => url,
        }
    }
}

pub struct AccessGateway {
    service: Arc<TokenService>,
    access_log: Arc<dyn AccessLog>,
    metrics: Arc<Metrics>,
    denial_url: String,
}

impl AccessGateway {
    pub fn new(
        service: Arc<TokenService>,
        access_log: Arc<dyn AccessLog>,
        metrics: Arc<Metrics>,
        denial_url: impl Into<String>,
    ) -> Self {
        Self {
            service,
            access_log,
            metrics,
            denial_url: denial_url.into(),
        }
    }

    /// Consume `token` and record the attempt.
    ///
    /// A store failure during consumption is returned as an error and no
    /// redirect to the destination happens.
    pub async fn handle(
        &self,
        token: &str,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AccessDecision, AppError> {
        let outcome = match self.service.consume(token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_store_error();
                error!(token = %token_prefix(token), "access check failed: {}", e);
                return Err(e);
            }
        };

        let kind = outcome.kind();
        self.metrics.record_access(kind);
        info!(
            token = %token_prefix(token),
            outcome = %kind,
            ip = client_ip.unwrap_or("-"),
            "access attempt"
        );

        let entry = AccessLogEntry::new(
            token,
            self.service.clock().now(),
            client_ip,
            user_agent,
            kind,
        );
        if let Err(e) = self.access_log.append(&entry).await {
            error!(token = %token_prefix(token), outcome = %kind, "failed to write access log: {:#}", e);
        }

        Ok(match outcome {
            Outcome::Granted(destination) => AccessDecision::Redirect(destination),
            Outcome::NotFound | Outcome::Expired | Outcome::AlreadyConsumed => {
                AccessDecision::Deny(self.denial_url.clone())
            }
        })
    }
}
