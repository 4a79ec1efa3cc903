//! Persistence error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store connection not established")]
    NotConnected,

    #[error("Gave up connecting to store after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid buffer configuration: {0}")]
    InvalidConfig(String),
}

impl PersistenceError {
    /// Short label used as a metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Timeout(_) => "timeout",
            Self::NotConnected => "not_connected",
            Self::ConnectExhausted { .. } => "connect_exhausted",
            Self::InvalidConfig(_) => "config",
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
