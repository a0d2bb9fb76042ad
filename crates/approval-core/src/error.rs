//! Error types for the approval engine

use thiserror::Error;

/// Main error type for all engine operations
///
/// The variants follow the engine's error taxonomy: configuration errors
/// fail an operation before any state is created, state errors leave state
/// unchanged, conflict errors mean a concurrent caller won the race, and
/// handler errors report a downstream failure after a committed transition.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
