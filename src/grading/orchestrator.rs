//! Submission grading against a resolved exercise.
//!
//! Two intents share one entry point: a `Run` executes the submission
//! for feedback and never touches progress; a `Submit` additionally
//! grades it and emits a progress delta for the caller's records. The
//! grader never persists anything itself.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GradingError;
use crate::exercise::{Exercise, ExerciseStatus, ProgressDelta, SqlExercise, TestResult};
use crate::sandbox::python::PythonSandbox;
use crate::sandbox::sql::SqlSandbox;
use crate::sandbox::{ExecutionResult, SqlExecutionResult};

/// What the caller wants from an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Feedback only; no grading, no progress.
    Run,
    /// Grade the submission and produce a progress delta.
    Submit,
}

/// Engine-specific execution outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EngineOutput {
    Code(ExecutionResult),
    Sql(SqlExecutionResult),
}

/// Execution outcome plus the progress delta a submit produced, if any.
#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub output: EngineOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<ProgressDelta>,
}

/// Routes one submission through the engine its exercise variant needs.
pub struct Grader<'a> {
    python: &'a PythonSandbox,
    sql: &'a mut SqlSandbox,
}

impl<'a> Grader<'a> {
    pub fn new(python: &'a PythonSandbox, sql: &'a mut SqlSandbox) -> Self {
        Self { python, sql }
    }

    /// Executes (and for submits, grades) a submission.
    ///
    /// `prior_attempts` is the caller's current attempt count; the delta
    /// carries the incremented value. Quiz and link-out exercises have no
    /// execution engine and are rejected.
    pub async fn grade(
        &mut self,
        exercise: &Exercise,
        submitted: &str,
        action: Action,
        prior_attempts: u32,
    ) -> Result<GradeOutcome, GradingError> {
        debug!(
            exercise = exercise.id(),
            kind = exercise.type_name(),
            ?action,
            "grading submission"
        );

        match exercise {
            Exercise::Code(code) => {
                let result = match action {
                    Action::Run => self.python.run_code(submitted).await?,
                    Action::Submit => self.python.run_tests(submitted, &code.test_cases).await?,
                };

                let delta = match action {
                    Action::Run => None,
                    Action::Submit => code_delta(exercise, submitted, &result, prior_attempts),
                };

                Ok(GradeOutcome {
                    output: EngineOutput::Code(result),
                    delta,
                })
            }
            Exercise::Sql(sql) => {
                let result = self.sql.run_query(submitted).await?;

                let delta = match action {
                    Action::Run => None,
                    Action::Submit => {
                        self.sql_delta(sql, exercise, submitted, &result, prior_attempts)
                            .await?
                    }
                };

                Ok(GradeOutcome {
                    output: EngineOutput::Sql(result),
                    delta,
                })
            }
            Exercise::Quiz(_) | Exercise::Colab(_) => {
                Err(GradingError::NoEngine(exercise.type_name().to_string()))
            }
        }
    }

    /// Grades an SQL submit. Precedence: declared test cases, then an
    /// expected result set, else the submission is ungradable and yields
    /// no delta.
    async fn sql_delta(
        &mut self,
        sql: &SqlExercise,
        exercise: &Exercise,
        submitted: &str,
        result: &SqlExecutionResult,
        prior_attempts: u32,
    ) -> Result<Option<ProgressDelta>, GradingError> {
        if !result.success {
            return Ok(None);
        }

        let (score, max_score, outcomes) = if !sql.test_cases.is_empty() {
            let mut results = Vec::with_capacity(sql.test_cases.len());
            let mut earned = 0;
            for case in &sql.test_cases {
                let outcome = self.sql.run_query(&case.test_code).await?;
                let passed = outcome.success;
                if passed {
                    earned += case.points;
                }
                results.push(TestResult {
                    test_id: case.id.clone(),
                    passed,
                    points_earned: if passed { case.points } else { 0 },
                    error_message: if passed {
                        None
                    } else {
                        case.failure_message(outcome.error)
                    },
                    execution_time_ms: Some(outcome.execution_time_ms),
                });
            }
            (earned, exercise.max_score(), Some(results))
        } else if let Some(expected) = &sql.expected_output {
            let matches = result.rows == *expected;
            (if matches { sql.points } else { 0 }, sql.points, None)
        } else {
            return Ok(None);
        };

        Ok(Some(build_delta(
            score,
            max_score,
            score == max_score && max_score > 0,
            submitted,
            prior_attempts,
            outcomes,
        )))
    }
}

/// Folds a graded code run into a delta. A submission that itself failed
/// produced no test outcomes and records nothing.
fn code_delta(
    exercise: &Exercise,
    submitted: &str,
    result: &ExecutionResult,
    prior_attempts: u32,
) -> Option<ProgressDelta> {
    let outcomes = result.test_results.as_ref()?;

    Some(build_delta(
        result.points_earned(),
        exercise.max_score(),
        result.success,
        submitted,
        prior_attempts,
        Some(outcomes.clone()),
    ))
}

fn build_delta(
    score: u32,
    max_score: u32,
    passed: bool,
    submitted: &str,
    prior_attempts: u32,
    test_results: Option<Vec<TestResult>>,
) -> ProgressDelta {
    let now = Utc::now();
    let status = if passed {
        ExerciseStatus::Completed
    } else {
        ExerciseStatus::InProgress
    };

    info!(score, max_score, ?status, "submission graded");

    ProgressDelta {
        status: Some(status),
        score: Some(score),
        max_score: Some(max_score),
        attempts: Some(prior_attempts + 1),
        test_results,
        completed_at: passed.then_some(now),
        last_attempt_at: Some(now),
        current_code: Some(submitted.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::{CodeExercise, Difficulty, TestCase};
    use crate::sandbox::provider::testing::ScriptedProvider;
    use std::time::Duration;

    fn python() -> PythonSandbox {
        PythonSandbox::new(
            Box::new(ScriptedProvider::new()),
            vec![],
            Duration::from_secs(5),
        )
    }

    fn case(id: &str, code: &str, points: u32) -> TestCase {
        TestCase {
            id: id.to_string(),
            name: format!("test {id}"),
            test_code: code.to_string(),
            points,
            hidden: false,
            error_message: None,
        }
    }

    fn code_exercise(tests: Vec<TestCase>) -> Exercise {
        Exercise::Code(CodeExercise {
            id: "ex-code".to_string(),
            title: "Sum it".to_string(),
            description: String::new(),
            instructions: "Sum the list".to_string(),
            difficulty: Difficulty::Beginner,
            points: 10,
            hints: vec![],
            tags: vec![],
            starter_code: String::new(),
            solution_code: String::new(),
            test_cases: tests,
            required_packages: vec![],
            datasets: vec![],
        })
    }

    fn sql_exercise(
        expected: Option<Vec<serde_json::Value>>,
        tests: Vec<TestCase>,
    ) -> (Exercise, SqlSandbox) {
        let exercise = Exercise::Sql(SqlExercise {
            id: "ex-sql".to_string(),
            title: "Top city".to_string(),
            description: String::new(),
            instructions: "Find it".to_string(),
            difficulty: Difficulty::Beginner,
            points: 10,
            hints: vec![],
            tags: vec![],
            schema_id: "core".to_string(),
            starter_code: String::new(),
            solution_query: String::new(),
            expected_output: expected,
            test_cases: tests,
            datasets: vec![],
        });
        let sandbox = SqlSandbox::new(
            None,
            vec![(
                "cities".to_string(),
                "name,population\nTokyo,37\nDelhi,32\n".to_string(),
            )],
        );
        (exercise, sandbox)
    }

    #[tokio::test]
    async fn test_run_never_produces_a_delta() {
        let python = python();
        let (exercise, mut sql) = sql_exercise(None, vec![]);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(
                &code_exercise(vec![case("t1", "print ok", 5)]),
                "print hi",
                Action::Run,
                0,
            )
            .await
            .unwrap();
        assert!(outcome.delta.is_none());

        let outcome = grader
            .grade(&exercise, "SELECT * FROM cities", Action::Run, 0)
            .await
            .unwrap();
        assert!(outcome.delta.is_none());
    }

    #[tokio::test]
    async fn test_passing_submit_completes() {
        let python = python();
        let (_, mut sql) = sql_exercise(None, vec![]);
        let mut grader = Grader::new(&python, &mut sql);
        let exercise = code_exercise(vec![case("t1", "print ok", 5), case("t2", "print ok", 5)]);

        let outcome = grader
            .grade(&exercise, "print hi", Action::Submit, 2)
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.status, Some(ExerciseStatus::Completed));
        assert_eq!(delta.score, Some(10));
        assert_eq!(delta.max_score, Some(10));
        assert_eq!(delta.attempts, Some(3));
        assert!(delta.completed_at.is_some());
        assert_eq!(delta.current_code.as_deref(), Some("print hi"));
    }

    #[tokio::test]
    async fn test_failing_tests_stay_in_progress() {
        let python = python();
        let (_, mut sql) = sql_exercise(None, vec![]);
        let mut grader = Grader::new(&python, &mut sql);
        let exercise = code_exercise(vec![
            case("t1", "print ok", 5),
            case("t2", "raise AssertionError", 5),
        ]);

        let outcome = grader
            .grade(&exercise, "print hi", Action::Submit, 0)
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.status, Some(ExerciseStatus::InProgress));
        assert_eq!(delta.score, Some(5));
        assert!(delta.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_broken_submission_records_nothing() {
        let python = python();
        let (_, mut sql) = sql_exercise(None, vec![]);
        let mut grader = Grader::new(&python, &mut sql);
        let exercise = code_exercise(vec![case("t1", "print ok", 5)]);

        let outcome = grader
            .grade(&exercise, "raise SyntaxError", Action::Submit, 0)
            .await
            .unwrap();

        assert!(outcome.delta.is_none());
        match outcome.output {
            EngineOutput::Code(result) => assert!(!result.success),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_sql_expected_output_exact_match() {
        let python = python();
        let expected = vec![serde_json::json!({"name": "Tokyo", "population": "37"})];
        let (exercise, mut sql) = sql_exercise(Some(expected), vec![]);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(
                &exercise,
                "SELECT name, population FROM cities WHERE name = 'Tokyo'",
                Action::Submit,
                0,
            )
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.status, Some(ExerciseStatus::Completed));
        assert_eq!(delta.score, Some(10));
    }

    #[tokio::test]
    async fn test_sql_row_order_matters() {
        let python = python();
        let expected = vec![
            serde_json::json!({"name": "Tokyo"}),
            serde_json::json!({"name": "Delhi"}),
        ];
        let (exercise, mut sql) = sql_exercise(Some(expected), vec![]);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(
                &exercise,
                "SELECT name FROM cities ORDER BY name",
                Action::Submit,
                0,
            )
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.status, Some(ExerciseStatus::InProgress));
        assert_eq!(delta.score, Some(0));
    }

    #[tokio::test]
    async fn test_sql_test_cases_take_precedence() {
        let python = python();
        let tests = vec![
            case("t1", "SELECT name FROM cities", 4),
            case("t2", "SELECT missing_column FROM cities", 6),
        ];
        let (exercise, mut sql) = sql_exercise(None, tests);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(&exercise, "SELECT * FROM cities", Action::Submit, 0)
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.score, Some(4));
        assert_eq!(delta.max_score, Some(10));
        assert_eq!(delta.status, Some(ExerciseStatus::InProgress));

        let results = delta.test_results.as_deref().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert_eq!(results[0].points_earned, 4);
        assert!(!results[1].passed);
        assert_eq!(results[1].points_earned, 0);
        assert!(results[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("missing_column"));
    }

    #[tokio::test]
    async fn test_sql_test_messages_respect_visibility() {
        let python = python();
        let mut hidden = case("t-hidden", "SELECT missing_column FROM cities", 6);
        hidden.hidden = true;
        let tests = vec![case("t-open", "SELECT name FROM cities", 4), hidden];
        let (exercise, mut sql) = sql_exercise(None, tests);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(&exercise, "SELECT * FROM cities", Action::Submit, 0)
            .await
            .unwrap();

        let delta = outcome.delta.unwrap();
        assert_eq!(delta.score, Some(4));
        assert_eq!(delta.max_score, Some(10));

        let results = delta.test_results.as_deref().unwrap();
        assert!(results[0].passed);
        assert!(!results[1].passed);
        // Hidden failures carry no message at all.
        assert!(results[1].error_message.is_none());
    }

    #[tokio::test]
    async fn test_failed_sql_submit_records_nothing() {
        let python = python();
        let expected = vec![serde_json::json!({"name": "Tokyo"})];
        let (exercise, mut sql) = sql_exercise(Some(expected), vec![]);
        let mut grader = Grader::new(&python, &mut sql);

        let outcome = grader
            .grade(&exercise, "SELECT * FROM nowhere", Action::Submit, 0)
            .await
            .unwrap();
        assert!(outcome.delta.is_none());
    }

    #[tokio::test]
    async fn test_quiz_has_no_engine() {
        let python = python();
        let (_, mut sql) = sql_exercise(None, vec![]);
        let mut grader = Grader::new(&python, &mut sql);
        let quiz: Exercise = serde_yaml::from_str(
            "id: q1\ntype: quiz\ntitle: Quick check\ninstructions: Answer\n\
             difficulty: beginner\npoints: 5\nquestions: []\npassing_score: 3\n",
        )
        .unwrap();

        let err = grader.grade(&quiz, "", Action::Submit, 0).await.unwrap_err();
        assert!(matches!(err, GradingError::NoEngine(_)));
    }
}
