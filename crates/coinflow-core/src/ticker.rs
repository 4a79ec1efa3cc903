//! Ticker update record.

use crate::symbol::Symbol;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One validated 24h-ticker snapshot for a tracked instrument.
///
/// `(symbol, event_time)` is the natural key. The store ignores a second
/// write of the same key, so redelivered feed records are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub symbol: Symbol,
    /// Exchange event time (naive UTC, millisecond resolution).
    pub event_time: NaiveDateTime,
    /// Last price.
    pub price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
    /// When the pipeline processed the record (naive UTC).
    pub ingest_time: NaiveDateTime,
}

impl TickerUpdate {
    /// Natural key of the record.
    #[inline]
    pub fn key(&self) -> (&Symbol, NaiveDateTime) {
        (&self.symbol, self.event_time)
    }

    /// Delay between the exchange event and ingestion, in milliseconds.
    ///
    /// Negative when the local clock lags the exchange clock.
    pub fn ingest_lag_ms(&self) -> i64 {
        (self.ingest_time - self.event_time).num_milliseconds()
    }
}
