//! Frame handling: normalize, buffer, flush.
//!
//! Runs inline on the feed task. A flush (and a store reconnect after a
//! failed one) blocks reading the next frame, so buffer mutation and
//! persistence never interleave.

use coinflow_core::now_naive_utc;
use coinflow_feed::{StatsSnapshot, TickerNormalizer};
use coinflow_persistence::{BufferConfig, FlushBuffer, FlushOutcome, PersistenceResult, TickSink};
use coinflow_telemetry::Metrics;
use coinflow_ws::{ConnectionState, FrameHandler, WsError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const SHUTDOWN_TRIGGER: &str = "shutdown";

/// Normalizer, buffer and sink for one process.
///
/// Outlives individual feed sessions: records buffered before a disconnect
/// are flushed by a later session.
pub struct IngestPipeline<S> {
    normalizer: TickerNormalizer,
    buffer: FlushBuffer,
    sink: S,
    /// Normalizer counters already exported to metrics.
    exported: StatsSnapshot,
}

impl<S: TickSink> IngestPipeline<S> {
    pub fn new(normalizer: TickerNormalizer, buffer: BufferConfig, sink: S) -> Self {
        Self {
            normalizer,
            buffer: FlushBuffer::new(buffer),
            sink,
            exported: StatsSnapshot::default(),
        }
    }

    pub fn buffer(&self) -> &FlushBuffer {
        &self.buffer
    }

    pub fn normalizer(&self) -> &TickerNormalizer {
        &self.normalizer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process one raw feed frame.
    pub async fn handle_frame(&mut self, frame: &str) {
        Metrics::frame_received();

        let ingest_time = now_naive_utc();
        for update in self.normalizer.normalize(frame, ingest_time) {
            Metrics::ingest_lag(update.ingest_lag_ms());
            self.buffer.append(update);
        }
        self.export_normalize_stats();
        Metrics::buffer_len(self.buffer.len());

        let now = Instant::now();
        if let Some(trigger) = self.buffer.should_flush(now) {
            if let Err(e) = self.flush(trigger.as_str(), now).await {
                error!(
                    trigger = trigger.as_str(),
                    pending = self.buffer.len(),
                    error = %e,
                    "Flush failed, keeping records and reconnecting store"
                );
                self.reconnect_sink().await;
            }
        }
    }

    /// Final flush before exit. One attempt, no reconnect.
    ///
    /// Returns `false` if buffered records could not be written.
    pub async fn shutdown(&mut self) -> bool {
        if self.buffer.is_empty() {
            info!("Buffer empty at shutdown");
            return true;
        }

        info!(pending = self.buffer.len(), "Final flush before exit");
        match self.flush(SHUTDOWN_TRIGGER, Instant::now()).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    lost = self.buffer.len(),
                    error = %e,
                    "Final flush failed, buffered records are lost"
                );
                false
            }
        }
    }

    async fn flush(&mut self, trigger: &str, started: Instant) -> PersistenceResult<FlushOutcome> {
        let evicted = self.buffer.take_evicted();
        if evicted > 0 {
            warn!(
                evicted,
                retained = self.buffer.len(),
                "Retention ceiling reached, dropped oldest records"
            );
            Metrics::records_evicted(evicted);
        }

        let result = self.buffer.flush_into(&mut self.sink, started).await;
        match &result {
            Ok(FlushOutcome::Empty) => {
                Metrics::flush(trigger, "empty");
            }
            Ok(FlushOutcome::Written { records, inserted }) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                Metrics::flush(trigger, "ok");
                Metrics::flush_duration(elapsed_ms);
                Metrics::rows_inserted(*inserted);
                Metrics::buffer_len(0);
                debug!(
                    trigger,
                    records,
                    inserted,
                    duplicates = (*records as u64).saturating_sub(*inserted),
                    elapsed_ms,
                    "Flushed batch"
                );
            }
            Err(_) => {
                Metrics::flush(trigger, "error");
            }
        }
        result
    }

    async fn reconnect_sink(&mut self) {
        match self.sink.reconnect().await {
            Ok(()) => Metrics::store_reconnect(true),
            Err(e) => {
                Metrics::store_reconnect(false);
                error!(error = %e, "Store reconnect failed, retrying on next flush");
            }
        }
    }

    fn export_normalize_stats(&mut self) {
        let current = self.normalizer.stats().snapshot();
        let delta = current.since(&self.exported);
        self.exported = current;

        Metrics::updates_accepted(delta.accepted);
        Metrics::skipped("invalid_frame", delta.frames_ignored);
        Metrics::skipped("untracked", delta.untracked);
        Metrics::skipped("malformed", delta.malformed);
    }
}

impl<S: TickSink + Send> FrameHandler for IngestPipeline<S> {
    async fn on_frame(&mut self, frame: &str) {
        self.handle_frame(frame).await;
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => Metrics::feed_connected(),
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                Metrics::feed_disconnected()
            }
        }
    }

    fn on_disconnect(&mut self, error: &WsError) {
        Metrics::feed_reconnect(error.reason());
    }
}
