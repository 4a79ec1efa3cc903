//! In-memory flush buffer.
//!
//! Updates accumulate in arrival order until a size or time trigger fires.
//! The buffer is cleared only after the sink acknowledges the whole batch,
//! so a failed write leaves every record in place for the next attempt.
//! While the store is down the buffer keeps at most `max_retained` records,
//! evicting the oldest first.

use crate::error::{PersistenceError, PersistenceResult};
use crate::sink::TickSink;
use coinflow_core::TickerUpdate;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Flush thresholds and retention ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Flush once this many records are buffered.
    pub size_threshold: usize,
    /// Flush once this much time has passed since the last successful flush.
    pub time_threshold: Duration,
    /// Upper bound on buffered records during store outages.
    pub max_retained: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size_threshold: 200,
            time_threshold: Duration::from_secs(1),
            max_retained: 100_000,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> PersistenceResult<()> {
        if self.size_threshold == 0 {
            return Err(PersistenceError::InvalidConfig(
                "size_threshold must be positive".to_string(),
            ));
        }
        if self.time_threshold.is_zero() {
            return Err(PersistenceError::InvalidConfig(
                "time_threshold must be positive".to_string(),
            ));
        }
        if self.max_retained < self.size_threshold {
            return Err(PersistenceError::InvalidConfig(format!(
                "max_retained ({}) must be at least size_threshold ({})",
                self.max_retained, self.size_threshold
            )));
        }
        Ok(())
    }
}

/// Why a flush was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Time,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Time => "time",
        }
    }
}

/// Result of a successful flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; the sink was not called.
    Empty,
    /// The batch was written. `inserted` excludes keys already stored.
    Written { records: usize, inserted: u64 },
}

#[derive(Debug)]
pub struct FlushBuffer {
    config: BufferConfig,
    records: VecDeque<TickerUpdate>,
    last_flush: Instant,
    /// Evictions not yet reported via `take_evicted`.
    pending_evictions: u64,
}

impl FlushBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let capacity = config.size_threshold.min(config.max_retained);
        Self {
            records: VecDeque::with_capacity(capacity),
            config,
            last_flush: Instant::now(),
            pending_evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Start of the last successful flush.
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Buffered records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &TickerUpdate> {
        self.records.iter()
    }

    /// Append one update. Returns `true` if the oldest record was evicted
    /// to stay within `max_retained`.
    pub fn append(&mut self, update: TickerUpdate) -> bool {
        let evicted = self.records.len() >= self.config.max_retained;
        if evicted {
            self.records.pop_front();
            self.pending_evictions += 1;
        }
        self.records.push_back(update);
        evicted
    }

    /// Append every update, returning how many old records were evicted.
    pub fn extend(&mut self, updates: impl IntoIterator<Item = TickerUpdate>) -> usize {
        updates
            .into_iter()
            .map(|update| self.append(update))
            .filter(|&evicted| evicted)
            .count()
    }

    /// Evictions since the previous call.
    pub fn take_evicted(&mut self) -> u64 {
        std::mem::take(&mut self.pending_evictions)
    }

    /// Check the flush triggers against `now`. Size wins when both fire.
    pub fn should_flush(&self, now: Instant) -> Option<FlushTrigger> {
        if self.records.len() >= self.config.size_threshold {
            Some(FlushTrigger::Size)
        } else if now.saturating_duration_since(self.last_flush) >= self.config.time_threshold {
            Some(FlushTrigger::Time)
        } else {
            None
        }
    }

    /// Hand the whole buffer to `sink` as one batch.
    ///
    /// On success the buffer is cleared and `started` becomes the last flush
    /// time. On failure nothing changes. An empty buffer skips the sink.
    pub async fn flush_into<S: TickSink>(
        &mut self,
        sink: &mut S,
        started: Instant,
    ) -> PersistenceResult<FlushOutcome> {
        if self.records.is_empty() {
            self.last_flush = started;
            return Ok(FlushOutcome::Empty);
        }

        let inserted = sink.write_batch(self.records.make_contiguous()).await?;
        let records = self.records.len();
        self.records.clear();
        self.last_flush = started;

        Ok(FlushOutcome::Written { records, inserted })
    }
}
