//! The registry: a tool catalogue reachable over MCP.

pub mod client;
pub mod service;

pub use client::{MetaOutcome, RegistryClient};
pub use service::{meta_tool_descriptors, serve_stdio, RegistryService, META_TOOL_NAMES};
