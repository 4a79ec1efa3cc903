//! Shared fixtures for coinflow-ingest integration tests.
//!
//! - Mock ticker feed server (push frames, drop or close connections)
//! - Frame builders

pub mod common;
