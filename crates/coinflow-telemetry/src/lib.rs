//! Prometheus metrics and structured logging for coinflow.
//!
//! - Process-wide Prometheus metrics behind the [`Metrics`] facade
//! - `/metrics` and `/health` over HTTP
//! - `tracing` subscriber setup (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{render_metrics, Metrics};
pub use server::{create_router, serve};
