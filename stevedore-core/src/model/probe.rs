use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The outcome of a single health-check request/response pair.
///
/// Ephemeral: results live only in the orchestrator's rolling window that
/// drives the backoff decision, never in the state tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbeResult {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub latency: Duration,
}

impl HealthProbeResult {
    pub fn ok(latency: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            latency,
        }
    }

    pub fn failed(latency: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            latency,
        }
    }
}
