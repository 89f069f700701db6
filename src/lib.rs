//! privlink — time-limited, single- or multi-use private access links.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` drive them directly against the in-memory store.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod server;
pub mod service;
pub mod store;

use clock::Clock;
use gateway::AccessGateway;
use metrics::Metrics;
use service::TokenService;
use store::{AccessLog, TokenStore};

/// Shared application state passed to handlers and background jobs.
pub struct AppState {
    pub config: config::Config,
    pub service: Arc<TokenService>,
    pub gateway: AccessGateway,
    pub access_log: Arc<dyn AccessLog>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: config::Config,
        store: Arc<dyn TokenStore>,
        access_log: Arc<dyn AccessLog>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let service = Arc::new(TokenService::new(
            store,
            clock,
            metrics.clone(),
            config.base_url.clone(),
        ));
        let gateway = AccessGateway::new(
            service.clone(),
            access_log.clone(),
            metrics.clone(),
            config.denial_url(),
        );

        Ok(Self {
            config,
            service,
            gateway,
            access_log,
            metrics,
        })
    }
}
