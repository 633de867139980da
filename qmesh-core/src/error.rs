//! Error types for qmesh

use thiserror::Error;

/// Main error type for qmesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for qmesh operations
pub type Result<T> = std::result::Result<T, Error>;
