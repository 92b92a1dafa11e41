//! Capability adapter implementations

pub mod knowledge;
pub mod remote;
