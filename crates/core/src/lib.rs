//! # Skiff Core
//!
//! Domain types, traits, and error definitions for the skiff agent runner.
//! This crate has **no framework dependencies**: it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Injecting providers, stores, and tools explicitly instead of through globals
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use memory::{MemoryBackend, MemoryEntry, MemoryQuery};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta, ToolDefinition, Usage};
pub use session::{LogRecord, PersistedEvent, Session, SessionStore, SessionUpdate};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
