//! Background job: delete expired access tokens.
//!
//! Runs on a fixed period (daily by default), independent of request
//! traffic. Only `access_tokens` rows with `expiration < now` are removed;
//! the access log is never touched.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::service::TokenService;

/// Spawn the background reclaimer task. Call this once at startup.
pub fn spawn(service: Arc<TokenService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_once(&service).await;
        }
    })
}

/// One sweep. Failures are logged and retried on the next tick.
pub async fn run_once(service: &TokenService) -> Option<u64> {
    match service.sweep().await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(rows = deleted, "reclaimed expired access tokens");
            } else {
                tracing::debug!("reclaimer: nothing expired");
            }
            Some(deleted)
        }
        Err(e) => {
            tracing::error!("reclaimer sweep failed: {}", e);
            None
        }
    }
}
