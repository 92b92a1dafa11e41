//! Core library for Concierge
//!
//! Provides the completion-backend abstraction over genai, the session
//! store trait with in-memory and SurrealDB implementations, and the
//! knowledge retriever client.

pub mod llm;
pub mod retrieval;
pub mod session;

pub use llm::{BackendReply, CapabilityCall, CompletionBackend, GenaiBackend, ToolSpec};
pub use retrieval::{HttpRetriever, KnowledgeRetriever, Relevance, RetrievedChunk};
pub use session::{MemorySessionStore, SessionStore, SurrealSessionStore};
