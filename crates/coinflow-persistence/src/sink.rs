//! Batch sink abstraction.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::NaiveDateTime;
use coinflow_core::{Symbol, TickerUpdate};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::future::Future;

/// Durable destination for flushed batches.
///
/// Implementations must be idempotent per `(symbol, event_time)`: writing a
/// key that already exists is skipped, not an error.
pub trait TickSink {
    /// Write one batch atomically. Returns the number of rows newly stored.
    fn write_batch(
        &mut self,
        batch: &[TickerUpdate],
    ) -> impl Future<Output = PersistenceResult<u64>> + Send;

    /// Drop the current store connection and open a new one.
    fn reconnect(&mut self) -> impl Future<Output = PersistenceResult<()>> + Send;
}

/// In-memory sink with the same conflict semantics as the database.
///
/// Used for `--dry-run` and in tests; `fail_next` injects write failures.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: BTreeMap<(Symbol, NaiveDateTime), TickerUpdate>,
    failures_remaining: u32,
    write_calls: u32,
    reconnects: u32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with `NotConnected`.
    pub fn fail_next(&mut self, n: u32) {
        self.failures_remaining = n;
    }

    /// Stored rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &TickerUpdate> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of `write_batch` calls, failed ones included.
    pub fn write_calls(&self) -> u32 {
        self.write_calls
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

impl TickSink for MemorySink {
    async fn write_batch(&mut self, batch: &[TickerUpdate]) -> PersistenceResult<u64> {
        self.write_calls += 1;
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(PersistenceError::NotConnected);
        }

        let mut inserted = 0;
        for update in batch {
            let (symbol, event_time) = update.key();
            if let Entry::Vacant(slot) = self.rows.entry((symbol.clone(), event_time)) {
                slot.insert(update.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn reconnect(&mut self) -> PersistenceResult<()> {
        self.reconnects += 1;
        Ok(())
    }
}
