//! Core domain types for the coinflow ingestion pipeline.
//!
//! This crate provides the types shared by every stage of the pipeline:
//! - `Symbol`, `TrackedSymbols`: instrument identifiers and the allow-list
//! - `TickerUpdate`: one validated ticker snapshot, keyed by (symbol, event_time)
//! - Time helpers converting exchange epoch milliseconds to naive UTC

pub mod error;
pub mod symbol;
pub mod ticker;
pub mod time;

pub use error::{CoreError, Result};
pub use symbol::{Symbol, TrackedSymbols, DEFAULT_TRACKED_SYMBOLS};
pub use ticker::TickerUpdate;
pub use time::{naive_utc_from_millis, now_naive_utc};
