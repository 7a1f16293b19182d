//! Health probing: one HTTP GET per poll, plus the rolling window that
//! drives the backoff decision.

use async_trait::async_trait;
use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use stevedore_core::HealthProbeResult;

/// The seam between the orchestrator and the probe transport, so tests can
/// script outcomes without a listening service.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issues one probe against `url`, bounded by `timeout`. Probes never
    /// error: a transport failure is a failed probe.
    async fn probe(&self, url: &str, timeout: Duration) -> HealthProbeResult;
}

/// Probes via HTTP GET; any 2xx response counts as healthy.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str, timeout: Duration) -> HealthProbeResult {
        let started = Instant::now();
        let outcome = self.client.get(url).timeout(timeout).send().await;
        let latency = started.elapsed();

        match outcome {
            Ok(response) if response.status().is_success() => HealthProbeResult::ok(latency),
            Ok(response) => {
                debug!("Probe: {} answered {}", url, response.status());
                HealthProbeResult::failed(latency)
            }
            Err(e) => {
                debug!("Probe: {} unreachable: {}", url, e);
                HealthProbeResult::failed(latency)
            }
        }
    }
}

/// Rolling window of recent probe results.
///
/// Only the tail matters: the consecutive-failure count decides both when
/// to give up and how long to wait before the next attempt.
pub struct ProbeWindow {
    results: VecDeque<HealthProbeResult>,
    capacity: usize,
}

impl ProbeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, result: HealthProbeResult) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    /// Failures since the last success, newest first.
    pub fn consecutive_failures(&self) -> u32 {
        self.results
            .iter()
            .rev()
            .take_while(|result| !result.success)
            .count() as u32
    }

    /// Delay before the next probe: `cap` on the healthy path, a doubling
    /// backoff starting at `base` while failing, never above `cap`.
    pub fn next_delay(&self, base: Duration, cap: Duration) -> Duration {
        let failures = self.consecutive_failures();
        if failures == 0 {
            return cap;
        }
        let factor = 1u32 << (failures - 1).min(16);
        base.saturating_mul(factor).min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> HealthProbeResult {
        HealthProbeResult::ok(Duration::from_millis(5))
    }

    fn failed() -> HealthProbeResult {
        HealthProbeResult::failed(Duration::from_millis(5))
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let mut window = ProbeWindow::new(4);
        window.record(failed());
        window.record(failed());
        assert_eq!(window.consecutive_failures(), 2);

        window.record(ok());
        assert_eq!(window.consecutive_failures(), 0);

        window.record(failed());
        assert_eq!(window.consecutive_failures(), 1);
    }

    #[test]
    fn window_is_bounded() {
        let mut window = ProbeWindow::new(2);
        for _ in 0..10 {
            window.record(failed());
        }
        // Only the retained tail counts.
        assert_eq!(window.consecutive_failures(), 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(3);
        let cap = Duration::from_secs(30);
        let mut window = ProbeWindow::new(8);

        assert_eq!(window.next_delay(base, cap), cap);

        window.record(failed());
        assert_eq!(window.next_delay(base, cap), Duration::from_secs(3));

        window.record(failed());
        assert_eq!(window.next_delay(base, cap), Duration::from_secs(6));

        window.record(failed());
        assert_eq!(window.next_delay(base, cap), Duration::from_secs(12));

        for _ in 0..5 {
            window.record(failed());
        }
        assert_eq!(window.next_delay(base, cap), cap);
    }
}
