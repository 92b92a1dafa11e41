//! Concierge Common - Shared utilities and types
//!
//! This crate provides the error type, configuration structs and the
//! conversation model used across all Concierge components.

pub mod config;
pub mod conversation;
pub mod error;

// Re-export commonly used items
pub use config::{ConciergeConfig, RemoteServiceConfig, RetrievalConfig, SessionStoreConfig};
pub use conversation::{Conversation, Role, Turn};
pub use error::{ConciergeError, Result};
