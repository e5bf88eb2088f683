use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DesolveError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Header error: {0}")]
    HeaderError(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Structural violation: {0}")]
    StructuralViolation(String),
    #[error("Observability violation: {0}")]
    ObservabilityViolation(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}
