//! Security module for skiff: working-directory confinement and audit logging.
//!
//! Provides:
//! - **Path confinement**: every tool path must resolve inside the session's working directory
//! - **Audit logging**: structured records of refused accesses and commands

pub mod audit;
pub mod path;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditSink, TracingSink};
pub use path::{normalize, PathValidationError, WorkspaceGuard};
