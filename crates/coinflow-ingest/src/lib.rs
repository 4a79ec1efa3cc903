//! coinflow ingestion service.
//!
//! Wires the feed supervisor, the ticker normalizer, the flush buffer and
//! the PostgreSQL store into one sequential pipeline:
//! - [`IngestPipeline`] handles each feed frame and decides when to flush
//! - [`Application`] builds the pipeline from [`AppConfig`] and runs it until Ctrl-C

pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use pipeline::IngestPipeline;
