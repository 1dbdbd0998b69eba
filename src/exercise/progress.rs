//! Learner progress shapes.
//!
//! The full `ExerciseProgress` record is owned by the external persistence
//! collaborator; the grading core only ever emits a `ProgressDelta`, a
//! partial update merged into that record keyed by (learner, exercise).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Learner standing on one exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// Outcome of one graded test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub passed: bool,
    /// Zero on failure, the test's full weight on pass.
    pub points_earned: u32,
    /// Absent when the test passed, and always absent for hidden tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// Per (learner, exercise) progress record, as held by the persistence
/// collaborator. Documented here as the interface the deltas merge into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProgress {
    pub user_id: String,
    pub exercise_id: String,
    pub status: ExerciseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_code: Option<String>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    pub max_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Partial progress update produced by a submit action.
///
/// Absent fields are omitted from the serialized form entirely: this is a
/// partial-update shape, never a full replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExerciseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ProgressDelta {
    /// True when the delta carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self == &ProgressDelta::default()
    }
}
