//! Prometheus metrics for the ingestion pipeline.
//!
//! All metrics live in the default registry as lazily registered statics.
//!
//! # Panics
//!
//! Registration uses `unwrap()`: it only fails on duplicate metric names,
//! which is a programming error that should crash on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Feed connection state (1 = connected, 0 = disconnected).
pub static FEED_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "coinflow_feed_connected",
        "Feed WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Feed sessions that ended in an error.
/// Labels: reason (closed/heartbeat_timeout/transport)
pub static FEED_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "coinflow_feed_reconnect_total",
        "Feed sessions ended by an error, by reason",
        &["reason"]
    )
    .unwrap()
});

pub static FRAMES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("coinflow_frames_total", "Text frames received from the feed").unwrap()
});

pub static UPDATES_ACCEPTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "coinflow_updates_accepted_total",
        "Ticker updates accepted into the buffer"
    )
    .unwrap()
});

/// Labels: reason (invalid_frame/untracked/malformed)
pub static SKIPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "coinflow_skipped_total",
        "Frames or elements dropped by the normalizer, by reason",
        &["reason"]
    )
    .unwrap()
});

pub static BUFFER_LEN: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("coinflow_buffer_len", "Records waiting in the flush buffer").unwrap()
});

/// Labels: trigger (size/time/shutdown), outcome (ok/empty/error)
pub static FLUSH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "coinflow_flush_total",
        "Flush attempts by trigger and outcome",
        &["trigger", "outcome"]
    )
    .unwrap()
});

pub static ROWS_INSERTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "coinflow_rows_inserted_total",
        "Rows newly inserted into the store (duplicates excluded)"
    )
    .unwrap()
});

/// Duration of flushes that reached the sink.
pub static FLUSH_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "coinflow_flush_duration_ms",
        "Flush duration in milliseconds",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0]
    )
    .unwrap()
});

pub static RECORDS_EVICTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "coinflow_records_evicted_total",
        "Buffered records dropped to stay within the retention ceiling"
    )
    .unwrap()
});

/// Labels: outcome (ok/error)
pub static STORE_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "coinflow_store_reconnect_total",
        "Store reconnect attempts after a failed flush",
        &["outcome"]
    )
    .unwrap()
});

/// Exchange event time to ingestion, in milliseconds.
pub static INGEST_LAG_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "coinflow_ingest_lag_ms",
        "Delay between exchange event time and ingestion in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn feed_connected() {
        FEED_CONNECTED.set(1);
    }

    pub fn feed_disconnected() {
        FEED_CONNECTED.set(0);
    }

    pub fn is_feed_connected() -> bool {
        FEED_CONNECTED.get() == 1
    }

    pub fn feed_reconnect(reason: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn frame_received() {
        FRAMES_TOTAL.inc();
    }

    pub fn updates_accepted(count: u64) {
        UPDATES_ACCEPTED_TOTAL.inc_by(count);
    }

    /// Record dropped input. Zero counts are ignored.
    pub fn skipped(reason: &str, count: u64) {
        if count > 0 {
            SKIPPED_TOTAL.with_label_values(&[reason]).inc_by(count);
        }
    }

    pub fn buffer_len(len: usize) {
        BUFFER_LEN.set(len as i64);
    }

    pub fn flush(trigger: &str, outcome: &str) {
        FLUSH_TOTAL.with_label_values(&[trigger, outcome]).inc();
    }

    pub fn flush_duration(ms: f64) {
        FLUSH_DURATION_MS.observe(ms);
    }

    pub fn rows_inserted(count: u64) {
        ROWS_INSERTED_TOTAL.inc_by(count);
    }

    pub fn records_evicted(count: u64) {
        RECORDS_EVICTED_TOTAL.inc_by(count);
    }

    pub fn store_reconnect(success: bool) {
        let outcome = if success { "ok" } else { "error" };
        STORE_RECONNECT_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Negative lags (local clock behind exchange) are recorded as zero.
    pub fn ingest_lag(ms: i64) {
        INGEST_LAG_MS.observe(ms.max(0) as f64);
    }
}

/// Encode the default registry in the Prometheus text format.
pub fn render_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_move() {
        let before = FLUSH_TOTAL.with_label_values(&["size", "ok"]).get();
        Metrics::flush("size", "ok");
        assert_eq!(FLUSH_TOTAL.with_label_values(&["size", "ok"]).get(), before + 1);

        let skipped = SKIPPED_TOTAL.with_label_values(&["untracked"]).get();
        Metrics::skipped("untracked", 0);
        assert_eq!(SKIPPED_TOTAL.with_label_values(&["untracked"]).get(), skipped);
        Metrics::skipped("untracked", 4);
        assert_eq!(
            SKIPPED_TOTAL.with_label_values(&["untracked"]).get(),
            skipped + 4
        );
    }

    #[test]
    fn test_feed_gauge() {
        Metrics::feed_connected();
        assert!(Metrics::is_feed_connected());
        Metrics::feed_disconnected();
        assert!(!Metrics::is_feed_connected());
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        Metrics::rows_inserted(3);
        Metrics::ingest_lag(-5);
        let text = render_metrics().unwrap();
        assert!(text.contains("coinflow_rows_inserted_total"));
        assert!(text.contains("coinflow_ingest_lag_ms_bucket"));
    }
}
