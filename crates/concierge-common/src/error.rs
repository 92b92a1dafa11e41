//! Concierge Common Error Types
//!
//! Centralized error handling for all Concierge components

use std::fmt;

/// Main error type for Concierge operations
#[derive(Debug)]
pub enum ConciergeError {
    /// Generic error with message
    Generic(String),
    /// IO-related errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(serde_json::Error),
    /// Configuration errors
    Config(String),
    /// Completion backend (LLM) errors - fatal for the current turn
    Backend(String),
    /// A capability name that is not present in the registry
    UnknownCapability(String),
    /// A capability name that is registered but disabled
    DisabledCapability(String),
    /// A capability name that is already registered
    DuplicateCapability(String),
    /// Capability construction failure, wrapping the underlying cause
    Construction { name: String, source: anyhow::Error },
    /// Capability execution failure
    Capability(String),
    /// Knowledge retriever errors
    Retrieval(String),
    /// Session store errors
    Store(String),
}

impl fmt::Display for ConciergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConciergeError::Generic(msg) => write!(f, "Concierge error: {}", msg),
            ConciergeError::Io(err) => write!(f, "IO error: {}", err),
            ConciergeError::Serde(err) => write!(f, "Serialization error: {}", err),
            ConciergeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ConciergeError::Backend(msg) => write!(f, "Completion backend error: {}", msg),
            ConciergeError::UnknownCapability(name) => {
                write!(f, "Unknown capability: {}", name)
            }
            ConciergeError::DisabledCapability(name) => {
                write!(f, "Capability is disabled: {}", name)
            }
            ConciergeError::DuplicateCapability(name) => {
                write!(f, "Capability already registered: {}", name)
            }
            ConciergeError::Construction { name, source } => {
                write!(f, "Failed to construct capability '{}': {}", name, source)
            }
            ConciergeError::Capability(msg) => write!(f, "Capability error: {}", msg),
            ConciergeError::Retrieval(msg) => write!(f, "Retrieval error: {}", msg),
            ConciergeError::Store(msg) => write!(f, "Session store error: {}", msg),
        }
    }
}

impl std::error::Error for ConciergeError {}

/// Convenience result type for Concierge operations
pub type Result<T> = std::result::Result<T, ConciergeError>;

// Implement From traits for common error types
impl From<std::io::Error> for ConciergeError {
    fn from(err: std::io::Error) -> Self {
        ConciergeError::Io(err)
    }
}

impl From<serde_json::Error> for ConciergeError {
    fn from(err: serde_json::Error) -> Self {
        ConciergeError::Serde(err)
    }
}

impl From<anyhow::Error> for ConciergeError {
    fn from(err: anyhow::Error) -> Self {
        ConciergeError::Generic(err.to_string())
    }
}
