//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations. All counters use Relaxed ordering:
//! they are statistics only and never drive alerting decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Dispatch latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000 ms
pub const DISPATCH_BUCKET_BOUNDS: [u64; 7] = [50, 100, 250, 500, 1000, 2500, 5000];
pub const DISPATCH_NUM_BUCKETS: usize = 8;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    DISPATCH_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Location batches received (monotonic)
    location_batches_total: AtomicU64,
    /// Samples skipped by the distance/time throttle (monotonic)
    samples_throttled_total: AtomicU64,
    /// Samples run through the proximity evaluator (monotonic)
    samples_evaluated_total: AtomicU64,
    /// Location errors reported by the device (monotonic)
    location_errors_total: AtomicU64,
    /// Feed snapshots applied (monotonic)
    feed_snapshots_total: AtomicU64,
    /// Feed errors (disconnects, malformed snapshots) (monotonic)
    feed_errors_total: AtomicU64,
    /// Alerts delivered to the notification channel (monotonic)
    alerts_dispatched_total: AtomicU64,
    /// Alerts the channel failed to deliver (monotonic)
    alerts_failed_total: AtomicU64,
    /// Entrances in range but suppressed by cooldown (monotonic)
    alerts_suppressed_total: AtomicU64,
    /// Events dropped because the coordinator channel was full (monotonic)
    events_dropped_total: AtomicU64,
    /// Dispatch latency histogram since process start, for scrapes (monotonic)
    dispatch_latency_buckets_total: [AtomicU64; DISPATCH_NUM_BUCKETS],
    /// Sum of all dispatch latencies since process start (ms, monotonic)
    dispatch_latency_sum_ms_total: AtomicU64,
    /// Dispatch latency histogram (reset on report)
    dispatch_latency_buckets: [AtomicU64; DISPATCH_NUM_BUCKETS],
    /// Sum of dispatch latencies since last report (ms)
    dispatch_latency_sum_ms: AtomicU64,
    /// Max dispatch latency since last report (ms)
    dispatch_latency_max_ms: AtomicU64,
    /// Dispatches since last report
    dispatches_since_report: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            location_batches_total: AtomicU64::new(0),
            samples_throttled_total: AtomicU64::new(0),
            samples_evaluated_total: AtomicU64::new(0),
            location_errors_total: AtomicU64::new(0),
            feed_snapshots_total: AtomicU64::new(0),
            feed_errors_total: AtomicU64::new(0),
            alerts_dispatched_total: AtomicU64::new(0),
            alerts_failed_total: AtomicU64::new(0),
            alerts_suppressed_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            dispatch_latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            dispatch_latency_sum_ms_total: AtomicU64::new(0),
            dispatch_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            dispatch_latency_sum_ms: AtomicU64::new(0),
            dispatch_latency_max_ms: AtomicU64::new(0),
            dispatches_since_report: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_location_batch(&self) {
        self.location_batches_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_throttled(&self) {
        self.samples_throttled_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_evaluated(&self) {
        self.samples_evaluated_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_snapshot(&self) {
        self.feed_snapshots_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_error(&self) {
        self.feed_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alerts_suppressed(&self, count: u64) {
        self.alerts_suppressed_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful dispatch and its channel latency
    #[inline]
    pub fn record_dispatch(&self, latency_ms: u64) {
        self.alerts_dispatched_total.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch_latency(latency_ms);
    }

    /// Record a failed dispatch; failures count toward latency too
    #[inline]
    pub fn record_dispatch_failure(&self, latency_ms: u64) {
        self.alerts_failed_total.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch_latency(latency_ms);
    }

    fn record_dispatch_latency(&self, latency_ms: u64) {
        let bucket = bucket_index(latency_ms);
        self.dispatch_latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        self.dispatch_latency_sum_ms_total.fetch_add(latency_ms, Ordering::Relaxed);

        self.dispatches_since_report.fetch_add(1, Ordering::Relaxed);
        self.dispatch_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.dispatch_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.dispatch_latency_max_ms, latency_ms);
    }

    pub fn alerts_dispatched(&self) -> u64 {
        self.alerts_dispatched_total.load(Ordering::Relaxed)
    }

    pub fn alerts_failed(&self) -> u64 {
        self.alerts_failed_total.load(Ordering::Relaxed)
    }

    /// Snapshot all counters, resetting the per-interval latency figures
    pub fn report(&self) -> MetricsSummary {
        let interval_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_secs_f64()
        };
        self.summarize(true, interval_secs)
    }

    /// Snapshot without resetting anything, for scrapes between reports
    pub fn snapshot(&self) -> MetricsSummary {
        let interval_secs = self.last_report_time.lock().elapsed().as_secs_f64();
        self.summarize(false, interval_secs)
    }

    fn summarize(&self, reset: bool, interval_secs: f64) -> MetricsSummary {
        let take = |atomic: &AtomicU64| {
            if reset {
                atomic.swap(0, Ordering::Relaxed)
            } else {
                atomic.load(Ordering::Relaxed)
            }
        };
        let dispatches = take(&self.dispatches_since_report);
        let latency_sum = take(&self.dispatch_latency_sum_ms);
        let latency_max = take(&self.dispatch_latency_max_ms);
        let mut latency_buckets = [0u64; DISPATCH_NUM_BUCKETS];
        for (i, bucket) in self.dispatch_latency_buckets.iter().enumerate() {
            latency_buckets[i] = take(bucket);
        }
        let latency_buckets_total: [u64; DISPATCH_NUM_BUCKETS] =
            std::array::from_fn(|i| self.dispatch_latency_buckets_total[i].load(Ordering::Relaxed));

        MetricsSummary {
            location_batches_total: self.location_batches_total.load(Ordering::Relaxed),
            samples_throttled_total: self.samples_throttled_total.load(Ordering::Relaxed),
            samples_evaluated_total: self.samples_evaluated_total.load(Ordering::Relaxed),
            location_errors_total: self.location_errors_total.load(Ordering::Relaxed),
            feed_snapshots_total: self.feed_snapshots_total.load(Ordering::Relaxed),
            feed_errors_total: self.feed_errors_total.load(Ordering::Relaxed),
            alerts_dispatched_total: self.alerts_dispatched_total.load(Ordering::Relaxed),
            alerts_failed_total: self.alerts_failed_total.load(Ordering::Relaxed),
            alerts_suppressed_total: self.alerts_suppressed_total.load(Ordering::Relaxed),
            events_dropped_total: self.events_dropped_total.load(Ordering::Relaxed),
            dispatch_latency_buckets_total: latency_buckets_total,
            dispatch_latency_sum_ms_total: self.dispatch_latency_sum_ms_total.load(Ordering::Relaxed),
            dispatch_latency_buckets: latency_buckets,
            dispatch_latency_avg_ms: if dispatches > 0 { latency_sum / dispatches } else { 0 },
            dispatch_latency_max_ms: latency_max,
            interval_secs,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub location_batches_total: u64,
    pub samples_throttled_total: u64,
    pub samples_evaluated_total: u64,
    pub location_errors_total: u64,
    pub feed_snapshots_total: u64,
    pub feed_errors_total: u64,
    pub alerts_dispatched_total: u64,
    pub alerts_failed_total: u64,
    pub alerts_suppressed_total: u64,
    pub events_dropped_total: u64,
    /// Cumulative per-bucket counts since start; never reset
    pub dispatch_latency_buckets_total: [u64; DISPATCH_NUM_BUCKETS],
    pub dispatch_latency_sum_ms_total: u64,
    /// Bounds: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000 ms
    pub dispatch_latency_buckets: [u64; DISPATCH_NUM_BUCKETS],
    pub dispatch_latency_avg_ms: u64,
    pub dispatch_latency_max_ms: u64,
    /// Seconds covered by the per-interval figures
    pub interval_secs: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            batches = %self.location_batches_total,
            evaluated = %self.samples_evaluated_total,
            throttled = %self.samples_throttled_total,
            location_errors = %self.location_errors_total,
            feed_snapshots = %self.feed_snapshots_total,
            feed_errors = %self.feed_errors_total,
            alerts = %self.alerts_dispatched_total,
            alerts_failed = %self.alerts_failed_total,
            suppressed = %self.alerts_suppressed_total,
            dispatch_avg_ms = %self.dispatch_latency_avg_ms,
            dispatch_max_ms = %self.dispatch_latency_max_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(5000), 6);
        assert_eq!(bucket_index(60_000), 7);
    }

    #[test]
    fn test_dispatch_counters() {
        let metrics = Metrics::new();
        metrics.record_dispatch(40);
        metrics.record_dispatch(300);
        metrics.record_dispatch_failure(6000);

        assert_eq!(metrics.alerts_dispatched(), 2);
        assert_eq!(metrics.alerts_failed(), 1);

        let summary = metrics.report();
        assert_eq!(summary.dispatch_latency_buckets[0], 1);
        assert_eq!(summary.dispatch_latency_buckets[3], 1);
        assert_eq!(summary.dispatch_latency_buckets[7], 1);
        assert_eq!(summary.dispatch_latency_max_ms, 6000);
        assert_eq!(summary.dispatch_latency_avg_ms, (40 + 300 + 6000) / 3);
    }

    #[test]
    fn test_report_resets_interval_figures_only() {
        let metrics = Metrics::new();
        metrics.record_dispatch(100);
        metrics.record_feed_snapshot();
        let _ = metrics.report();

        let second = metrics.report();
        assert_eq!(second.dispatch_latency_max_ms, 0);
        assert_eq!(second.dispatch_latency_buckets.iter().sum::<u64>(), 0);
        assert_eq!(second.alerts_dispatched_total, 1);
        assert_eq!(second.feed_snapshots_total, 1);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_dispatch(100);

        assert_eq!(metrics.snapshot().dispatch_latency_max_ms, 100);
        assert_eq!(metrics.snapshot().dispatch_latency_buckets[1], 1);
        assert_eq!(metrics.report().dispatch_latency_max_ms, 100);
        assert_eq!(metrics.snapshot().dispatch_latency_max_ms, 0);
    }

    #[test]
    fn test_cumulative_histogram_survives_report() {
        let metrics = Metrics::new();
        metrics.record_dispatch(80);
        metrics.record_dispatch_failure(3000);
        let _ = metrics.report();
        metrics.record_dispatch(20);

        let summary = metrics.snapshot();
        assert_eq!(summary.dispatch_latency_buckets_total[0], 1);
        assert_eq!(summary.dispatch_latency_buckets_total[1], 1);
        assert_eq!(summary.dispatch_latency_buckets_total[6], 1);
        assert_eq!(summary.dispatch_latency_sum_ms_total, 80 + 3000 + 20);
        // The per-interval view only holds what came after the report
        assert_eq!(summary.dispatch_latency_buckets.iter().sum::<u64>(), 1);
    }
}
