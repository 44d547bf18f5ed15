//! Observability (tracing setup, resolution counters)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(
    config: &TelemetryConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Pretty => builder.try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }

    Ok(())
}

/// Counters for failure resolution outcomes
#[derive(Debug, Default)]
pub struct ResolutionMetrics {
    responded: AtomicU64,
    redispatched: AtomicU64,
    passed_through: AtomicU64,
    double_faults: AtomicU64,
}

impl ResolutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responded(&self) {
        self.responded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "responded", "Metric incremented");
    }

    pub fn redispatched(&self) {
        self.redispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "redispatched", "Metric incremented");
    }

    pub fn passed_through(&self) {
        self.passed_through.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "passed_through", "Metric incremented");
    }

    pub fn double_fault(&self) {
        self.double_faults.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "double_faults", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            responded: self.responded.load(Ordering::Relaxed),
            redispatched: self.redispatched.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            double_faults: self.double_faults.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub responded: u64,
    pub redispatched: u64,
    pub passed_through: u64,
    pub double_faults: u64,
}
