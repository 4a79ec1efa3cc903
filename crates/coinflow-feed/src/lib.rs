//! Ticker feed normalization for coinflow.
//!
//! Turns raw `!ticker@arr` frames into validated [`TickerUpdate`]s,
//! dropping untracked instruments and malformed elements.
//!
//! [`TickerUpdate`]: coinflow_core::TickerUpdate

pub mod error;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use parser::{NormalizeStats, StatsSnapshot, TickerNormalizer};
