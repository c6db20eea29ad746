//! Counters for daemon status reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Atomic metrics for daemon performance tracking.
pub struct Metrics {
    /// Total number of requests processed
    pub requests_total: AtomicU64,
    /// Sum of all request latencies in microseconds
    pub requests_latency_us: AtomicU64,
    /// Readings accepted into the store
    pub readings_ingested: AtomicU64,
    /// Payloads dropped by validation
    pub payloads_rejected: AtomicU64,
    /// Readings kept in memory but not persisted
    pub writes_failed: AtomicU64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_latency_us: AtomicU64::new(0),
            readings_ingested: AtomicU64::new(0),
            payloads_rejected: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request.
    pub fn record_request(&self, latency: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_ingested(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.payloads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get average request latency.
    pub fn avg_latency(&self) -> Duration {
        let total = self.requests_total.load(Ordering::Relaxed);
        let latency_us = self.requests_latency_us.load(Ordering::Relaxed);
        if total == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(latency_us / total)
        }
    }

    pub fn ingested(&self) -> u64 {
        self.readings_ingested.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.payloads_rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_latency() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_latency(), Duration::ZERO);

        metrics.record_request(Duration::from_millis(2));
        metrics.record_request(Duration::from_millis(4));
        assert_eq!(metrics.avg_latency(), Duration::from_millis(3));
    }

    #[test]
    fn test_ingest_counters() {
        let metrics = Metrics::new();
        metrics.record_ingested();
        metrics.record_ingested();
        metrics.record_rejected();
        assert_eq!(metrics.ingested(), 2);
        assert_eq!(metrics.rejected(), 1);
    }
}
