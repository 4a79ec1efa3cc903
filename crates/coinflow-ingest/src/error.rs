//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid symbol configuration: {0}")]
    Core(#[from] coinflow_core::CoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] coinflow_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
