//! Execution sandboxes for untrusted learner submissions.
//!
//! Two independent, structurally parallel engines:
//! - [`python::PythonSandbox`] drives an interpreted-language runtime
//!   behind a pluggable provider (default: a Python subprocess driver).
//! - [`sql::SqlSandbox`] drives an embedded in-memory SQLite database.
//!
//! Both follow the same lifecycle: lazily bootstrapped on first use,
//! terminal error state on bootstrap failure, non-throwing results for
//! user-code faults.

pub mod bridge;
pub mod csv;
pub mod provider;
pub mod python;
pub mod sql;

use serde::{Deserialize, Serialize};

use crate::exercise::TestResult;

/// Lifecycle state of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Uninitialized,
    Bootstrapping,
    Ready,
    /// Terminal for the session; constructing a fresh sandbox is the only
    /// recovery.
    Error,
}

/// Outcome of running a program in the interpreter sandbox.
///
/// Failures of the submitted code are data, not errors: `success` is
/// false, `error` holds the exception text, and `stdout`/`stderr` keep
/// whatever was captured before the fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the submission was killed for exceeding its wall-clock
    /// budget.
    #[serde(default)]
    pub timed_out: bool,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
}

impl ExecutionResult {
    /// Total points earned across test results, zero when no tests ran.
    pub fn points_earned(&self) -> u32 {
        self.test_results
            .as_deref()
            .map(|tests| tests.iter().map(|t| t.points_earned).sum())
            .unwrap_or(0)
    }
}

/// Outcome of running a statement-or-batch in the relational sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlExecutionResult {
    pub success: bool,
    /// Column names of the first result set; empty when the statement
    /// produced none.
    pub columns: Vec<String>,
    /// Row mappings (column name -> value) of the first result set.
    pub rows: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// Modified-row count for statements without a result set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}
