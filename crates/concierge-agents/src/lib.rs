//! Capability system and message router for Concierge
//!
//! A capability is a named, independently implemented unit of behavior the
//! router may delegate to. Capabilities are declared in a YAML registry
//! file, constructed lazily from a closed set of kinds, and surfaced to the
//! completion backend as callable tools.

pub mod capabilities;
pub mod capability;
pub mod registry;
pub mod router;

pub use capabilities::knowledge::KnowledgeCapability;
pub use capabilities::remote::{JsonRpcService, RemoteToolCapability};
pub use capability::{Capability, CapabilityBackends, CapabilityDescriptor, CapabilityKind};
pub use registry::CapabilityRegistry;
pub use router::Router;
