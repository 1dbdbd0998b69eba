//! Error types for gradebox subsystems.
//!
//! One enum per subsystem:
//! - Content loading and resolution
//! - Sandbox lifecycle (bootstrap and session failures)
//! - Grading orchestration
//!
//! User-code execution failures are deliberately NOT errors: they come back
//! as structured results so the caller can still render whatever output was
//! captured before the fault.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving course content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content document not found at '{path}'")]
    NotFound { path: PathBuf },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Exercise '{exercise_id}' not found in course '{course}': {direct}")]
    ExerciseUnresolved {
        exercise_id: String,
        course: String,
        /// The targeted lookup's failure, preserved so the fallback scan
        /// never masks which specific path failed.
        #[source]
        direct: Box<ContentError>,
    },
}

impl ContentError {
    /// The path the failing lookup targeted, when one exists.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ContentError::NotFound { path }
            | ContentError::Io { path, .. }
            | ContentError::Parse { path, .. } => Some(path),
            ContentError::ExerciseUnresolved { direct, .. } => direct.path(),
        }
    }
}

/// Errors that can occur in the execution sandboxes.
///
/// These cover everything short of user-code execution: a failing
/// bootstrap, a dead session, or a fault in the embedded engine itself.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Runtime bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Sandbox session is unusable: {0}")]
    Unavailable(String),

    #[error("Runtime bridge error: {0}")]
    Bridge(#[from] crate::sandbox::bridge::BridgeError),

    #[error("Embedded database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that can occur during grading orchestration.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("No grading engine for '{0}' exercises")]
    NoEngine(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
