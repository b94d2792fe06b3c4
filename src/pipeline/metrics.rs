//! Lock-free pipeline metrics
//!
//! All counters are monotone atomics; min/max processing time uses a
//! compare-and-swap retry loop so workers never contend on a lock. The
//! statistics task only loads, so no synchronisation beyond the atomics is
//! needed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Pipeline counters and latency tracking, microsecond precision
#[derive(Debug)]
pub struct PipelineMetrics {
    messages_consumed: AtomicU64,
    messages_processed: AtomicU64,
    messages_published: AtomicU64,
    messages_skipped: AtomicU64,
    decode_errors: AtomicU64,
    processing_errors: AtomicU64,
    bus_errors: AtomicU64,
    publish_errors: AtomicU64,
    snapshots_published: AtomicU64,
    cdc_events_published: AtomicU64,
    total_processing_time_us: AtomicU64,
    max_processing_time_us: AtomicU64,
    min_processing_time_us: AtomicU64,
    started_at: Instant,
}

impl PipelineMetrics {
    /// Create zeroed metrics anchored at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages_consumed: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            messages_skipped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            processing_errors: AtomicU64::new(0),
            bus_errors: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
            cdc_events_published: AtomicU64::new(0),
            total_processing_time_us: AtomicU64::new(0),
            max_processing_time_us: AtomicU64::new(0),
            min_processing_time_us: AtomicU64::new(u64::MAX),
            started_at: Instant::now(),
        }
    }

    /// Record one consumed record
    #[inline]
    pub fn incr_consumed(&self) {
        self.messages_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successfully processed snapshot
    #[inline]
    pub fn incr_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one published snapshot projection
    #[inline]
    pub fn incr_snapshot_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one published CDC event
    #[inline]
    pub fn incr_cdc_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.cdc_events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope that was not an order book snapshot
    #[inline]
    pub fn incr_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope that failed to decode
    #[inline]
    pub fn incr_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a snapshot the book state rejected
    #[inline]
    pub fn incr_processing_errors(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a consumer-side bus error
    #[inline]
    pub fn incr_bus_errors(&self) {
        self.bus_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed producer enqueue
    #[inline]
    pub fn incr_publish_errors(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one per-message processing time into the totals
    pub fn record_processing_time(&self, elapsed_us: u64) {
        self.total_processing_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);

        let mut current_max = self.max_processing_time_us.load(Ordering::Acquire);
        while elapsed_us > current_max {
            match self.max_processing_time_us.compare_exchange_weak(
                current_max,
                elapsed_us,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }

        let mut current_min = self.min_processing_time_us.load(Ordering::Acquire);
        while elapsed_us < current_min {
            match self.min_processing_time_us.compare_exchange_weak(
                current_min,
                elapsed_us,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current_min = observed,
            }
        }
    }

    /// Consistent-enough copy of all counters for reporting
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.messages_processed.load(Ordering::Relaxed);
        let total_us = self.total_processing_time_us.load(Ordering::Relaxed);
        let raw_min = self.min_processing_time_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            messages_consumed: self.messages_consumed.load(Ordering::Relaxed),
            messages_processed: processed,
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_skipped: self.messages_skipped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            bus_errors: self.bus_errors.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
            cdc_events_published: self.cdc_events_published.load(Ordering::Relaxed),
            min_processing_time_us: if processed == 0 { 0 } else { raw_min },
            max_processing_time_us: self.max_processing_time_us.load(Ordering::Relaxed),
            avg_processing_time_us: if processed == 0 {
                0.0
            } else {
                total_us as f64 / processed as f64
            },
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the pipeline metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Seconds since the metrics were created
    pub uptime_secs: u64,
    /// Records taken from the consumer
    pub messages_consumed: u64,
    /// Snapshots successfully applied
    pub messages_processed: u64,
    /// Messages handed to the producer
    pub messages_published: u64,
    /// Envelopes skipped for not being snapshots
    pub messages_skipped: u64,
    /// Envelopes that failed to decode
    pub decode_errors: u64,
    /// Snapshots rejected during processing
    pub processing_errors: u64,
    /// Consumer-side bus errors
    pub bus_errors: u64,
    /// Failed producer enqueues
    pub publish_errors: u64,
    /// Snapshot projections published
    pub snapshots_published: u64,
    /// CDC events published
    pub cdc_events_published: u64,
    /// Fastest message, microseconds
    pub min_processing_time_us: u64,
    /// Slowest message, microseconds
    pub max_processing_time_us: u64,
    /// Mean per-message time, microseconds
    pub avg_processing_time_us: f64,
}

impl MetricsSnapshot {
    /// Consumed messages per second over the uptime
    #[must_use]
    pub fn message_rate(&self) -> f64 {
        if self.uptime_secs == 0 {
            return 0.0;
        }
        self.messages_consumed as f64 / self.uptime_secs as f64
    }
}
