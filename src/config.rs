//! Runtime settings for the execution sandboxes.
//!
//! Loaded from an optional `environments.yaml` at the content root;
//! every field has a default so a missing file or a partial document is
//! fine. Settings are read once at startup, not re-read per request.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ContentError;

/// Top-level runtime settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub python: PythonSettings,
}

impl RuntimeSettings {
    /// Reads settings from a YAML document. A missing file yields the
    /// defaults; a present-but-invalid one is an error.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings document, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ContentError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        serde_yaml::from_str(&text).map_err(|e| ContentError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Interpreter sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonSettings {
    /// Interpreter binary used to host the runtime driver.
    pub interpreter: String,
    /// Packages imported eagerly at bootstrap.
    pub default_packages: Vec<String>,
    pub bootstrap_timeout_secs: u64,
    /// Per-execution wall-clock budget.
    pub exec_timeout_secs: u64,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            default_packages: Vec::new(),
            bootstrap_timeout_secs: 60,
            exec_timeout_secs: 10,
        }
    }
}

impl PythonSettings {
    pub fn bootstrap_budget(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn exec_budget(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}
