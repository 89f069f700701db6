//! Prometheus metrics for privlink.
//!
//! Exposed on `/metrics`. Bearers only ever see a redirect; these counters
//! are where operators see which denial reason actually occurred.

use prometheus::{opts, Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

use crate::models::token::{OutcomeKind, UsageMode};

/// Label used when the store failed before an outcome was known.
pub const STORE_ERROR_LABEL: &str = "store_error";

pub struct Metrics {
    registry: Registry,
    access_total: IntCounterVec,
    issued_total: IntCounterVec,
    reclaimed_total: IntCounter,
}

impl Metrics {
    /// Create all metrics on a fresh registry owned by this recorder.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let access_total = IntCounterVec::new(
            opts!("privlink_access_total", "Access attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(access_total.clone()))?;

        let issued_total = IntCounterVec::new(
            opts!("privlink_issued_total", "Tokens issued by usage mode"),
            &["usage_mode"],
        )?;
        registry.register(Box::new(issued_total.clone()))?;

        let reclaimed_total = IntCounter::with_opts(opts!(
            "privlink_reclaimed_total",
            "Expired tokens deleted by the reclaimer"
        ))?;
        registry.register(Box::new(reclaimed_total.clone()))?;

        Ok(Self {
            registry,
            access_total,
            issued_total,
            reclaimed_total,
        })
    }

    pub fn record_access(&self, outcome: OutcomeKind) {
        self.access_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_store_error(&self) {
        self.access_total
            .with_label_values(&[STORE_ERROR_LABEL])
            .inc();
    }

    pub fn record_issued(&self, mode: UsageMode) {
        self.issued_total.with_label_values(&[mode.as_str()]).inc();
    }

    pub fn record_reclaimed(&self, rows: u64) {
        self.reclaimed_total.inc_by(rows);
    }

    pub fn access_count(&self, outcome: OutcomeKind) -> u64 {
        self.access_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Encode all registered metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
