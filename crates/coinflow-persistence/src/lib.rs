//! Tick buffering and persistence for coinflow.
//!
//! [`FlushBuffer`] accumulates normalized updates until a size or time
//! trigger fires; a [`TickSink`] receives each batch. [`PgTickStore`] is the
//! PostgreSQL sink and also serves the forecast read side.

pub mod backoff;
pub mod buffer;
pub mod error;
pub mod forecast;
pub mod schema;
pub mod sink;
pub mod store;

pub use backoff::RetryPolicy;
pub use buffer::{BufferConfig, FlushBuffer, FlushOutcome, FlushTrigger};
pub use error::{PersistenceError, PersistenceResult};
pub use forecast::{ForecastPoint, Forecaster, Granularity, PriceSample};
pub use sink::{MemorySink, TickSink};
pub use store::{PgTickStore, StoreConfig};

#[cfg(test)]
mod fixtures;
