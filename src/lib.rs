//! gradebox: the interactive-exercise core of a course platform.
//!
//! A content tree on disk holds courses, lessons, exercise definitions,
//! shared datasets, and SQL schemas. This crate parses lesson embeds,
//! resolves exercises with their dependencies, executes untrusted
//! submissions in sandboxed engines, and grades the outcomes into
//! progress deltas.

// Core modules
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod exercise;
pub mod grading;
pub mod sandbox;

// Re-export commonly used error types
pub use error::{ContentError, GradingError, SandboxError};
