//! Feed error types.
//!
//! These never leave the normalizer: a failing element is counted and
//! skipped, its siblings are still processed.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Element is not an object")]
    NotAnObject,

    #[error("Symbol not tracked")]
    Untracked,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

pub type FeedResult<T> = Result<T, FeedError>;
