//! Grading orchestration: routes submissions to the engine matching the
//! exercise variant and folds outcomes into progress deltas.

mod orchestrator;

pub use orchestrator::{Action, EngineOutput, GradeOutcome, Grader};
