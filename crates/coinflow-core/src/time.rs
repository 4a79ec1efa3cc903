//! Timestamp normalization.
//!
//! The store keeps timezone-naive UTC timestamps, so every instant that
//! enters the pipeline is converted here.

use crate::error::{CoreError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Convert exchange epoch milliseconds into a naive UTC timestamp.
pub fn naive_utc_from_millis(ms: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or(CoreError::TimestampOutOfRange(ms))
}

/// Current wall-clock time as naive UTC.
#[inline]
pub fn now_naive_utc() -> NaiveDateTime {
    Utc::now().naive_utc()
}
