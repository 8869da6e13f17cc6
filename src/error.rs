use std::time::Duration;

use thiserror::Error;

/// Errors raised by board construction, table building and solving.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Board input is not a permutation of 0..=15
    #[error("invalid board: {0}")]
    InvalidBoard(#[from] BoardError),

    /// Pattern partition is not a disjoint cover of tiles 1..=15
    #[error("invalid pattern partition: {0}")]
    InvalidPartition(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A solve request broke an internal invariant and was abandoned
    #[error("internal solver error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Defects found while validating raw tiles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("expected 16 tiles, got {0}")]
    WrongLength(usize),

    #[error("tile value {0} is out of range (must be 0-15)")]
    OutOfRange(u8),

    #[error("tile value {0} appears more than once")]
    Duplicate(u8),

    #[error("move {step} ({direction}) leaves the board")]
    IllegalMove { step: usize, direction: String },
}

/// Failures of the reference collection capability. Never fatal to a solve.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("reference collection unavailable: {0}")]
    Unavailable(String),

    #[error("reference collection did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
