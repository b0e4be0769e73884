//! Error module for the Rusty LGN library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum LgnError {
    /// Error for invalid parameters, e.g., unequal spatial quantization steps.
    InvalidParameters(String),
    /// Error while parsing a weight or delay combination expression.
    InvalidExpression(String),
    /// Error for an expression variable with no matching connector function.
    UnresolvedVariable(String),
    /// Error for out of bounds access, e.g., neuron not found.
    OutOfBounds(String),
    /// Error for a missing per-neuron annotation.
    MissingAnnotation(String),
    /// Error for invalid operation, e.g., reading a response before any frame was viewed.
    InvalidOperation(String),
    /// Error reported by the simulator backend.
    BackendError(String),
    /// Error for I/O operations, e.g., an unreadable stimulus cache file.
    IOError(String),
}

impl fmt::Display for LgnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LgnError::InvalidParameters(e) => write!(f, "Invalid parameters: {}", e),
            LgnError::InvalidExpression(e) => write!(f, "Invalid expression: {}", e),
            LgnError::UnresolvedVariable(e) => write!(f, "Unresolved expression variable: {}", e),
            LgnError::OutOfBounds(e) => write!(f, "Index out of bounds: {}", e),
            LgnError::MissingAnnotation(e) => write!(f, "Missing annotation: {}", e),
            LgnError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            LgnError::BackendError(e) => write!(f, "Backend error: {}", e),
            LgnError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for LgnError {}

impl From<std::io::Error> for LgnError {
    fn from(e: std::io::Error) -> Self {
        LgnError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for LgnError {
    fn from(e: serde_json::Error) -> Self {
        LgnError::IOError(e.to_string())
    }
}
