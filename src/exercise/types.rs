//! Exercise definitions as stored in per-exercise YAML documents.
//!
//! An exercise is polymorphic over its `type` tag; exactly one variant's
//! fields exist per instance, which the enum representation enforces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Difficulty tier shown to the learner and used for course sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// A graded check run against submitted code.
///
/// The meaning of `test_code` depends on the exercise variant: a Python
/// snippet executed against the learner's live environment, or a SQL
/// statement executed against the sandbox database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub test_code: String,
    /// Point weight awarded on pass. Weights are non-negative; their sum
    /// is the exercise's maximum score.
    pub points: u32,
    /// Hidden tests suppress failure detail from the learner.
    #[serde(default)]
    pub hidden: bool,
    /// Custom message shown instead of the raw exception text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TestCase {
    /// The message to record for a failed run of this test.
    ///
    /// Hidden tests report nothing; otherwise the declared custom message
    /// wins over the raw engine text.
    pub fn failure_message(&self, raw: Option<String>) -> Option<String> {
        if self.hidden {
            return None;
        }
        self.error_message
            .clone()
            .or(raw)
            .or_else(|| Some("Test failed".to_string()))
    }
}

/// A dataset declared by an exercise, resolved to raw tabular text at load
/// time and held only for the duration of one sandbox session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReference {
    pub id: String,
    /// Storage path relative to the content store's shared dataset root.
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional inferred column-type map (column name -> type name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<std::collections::HashMap<String, String>>,
}

/// An interpreted-code exercise graded by test snippets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    pub difficulty: Difficulty,
    pub points: u32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub starter_code: String,
    #[serde(default)]
    pub solution_code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub required_packages: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetReference>,
}

/// A relational-query exercise graded by expected output or test queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlExercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    pub difficulty: Difficulty,
    pub points: u32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Names the schema document applied to the sandbox before grading.
    pub schema_id: String,
    pub starter_code: String,
    #[serde(default)]
    pub solution_query: String,
    /// Expected result rows, order-sensitive. Each entry is a
    /// column-name -> value mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Vec<Value>>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub datasets: Vec<DatasetReference>,
}

/// One answer option of a quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

/// One quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuizQuestionKind,
    pub options: Vec<QuizOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizQuestionKind {
    Mcq,
    TrueFalse,
    MultipleSelect,
}

/// An inline quiz. Graded by the presentation layer, not by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizExercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    pub difficulty: Difficulty,
    pub points: u32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: u32,
}

/// An external-notebook exercise launched in Colab; completion is manual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColabExercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    pub difficulty: Difficulty,
    pub points: u32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub colab_url: String,
    pub notebook_name: String,
    #[serde(default)]
    pub completion_criteria: String,
}

/// An exercise definition, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Exercise {
    #[serde(rename = "code", alias = "code-python")]
    Code(CodeExercise),
    #[serde(rename = "sql")]
    Sql(SqlExercise),
    #[serde(rename = "quiz")]
    Quiz(QuizExercise),
    #[serde(rename = "colab", alias = "colab-link")]
    Colab(ColabExercise),
}

impl Exercise {
    pub fn id(&self) -> &str {
        match self {
            Exercise::Code(e) => &e.id,
            Exercise::Sql(e) => &e.id,
            Exercise::Quiz(e) => &e.id,
            Exercise::Colab(e) => &e.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Exercise::Code(e) => &e.title,
            Exercise::Sql(e) => &e.title,
            Exercise::Quiz(e) => &e.title,
            Exercise::Colab(e) => &e.title,
        }
    }

    pub fn points(&self) -> u32 {
        match self {
            Exercise::Code(e) => e.points,
            Exercise::Sql(e) => e.points,
            Exercise::Quiz(e) => e.points,
            Exercise::Colab(e) => e.points,
        }
    }

    /// The variant tag as it appears in exercise documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            Exercise::Code(_) => "code",
            Exercise::Sql(_) => "sql",
            Exercise::Quiz(_) => "quiz",
            Exercise::Colab(_) => "colab",
        }
    }

    /// Dataset references declared by this exercise.
    pub fn datasets(&self) -> &[DatasetReference] {
        match self {
            Exercise::Code(e) => &e.datasets,
            Exercise::Sql(e) => &e.datasets,
            _ => &[],
        }
    }

    /// Maximum attainable score.
    ///
    /// For code/SQL variants with test cases this is the sum of test
    /// weights; a SQL exercise graded by expected output is worth its
    /// declared point value.
    pub fn max_score(&self) -> u32 {
        match self {
            Exercise::Code(e) => e.test_cases.iter().map(|t| t.points).sum(),
            Exercise::Sql(e) => {
                if e.test_cases.is_empty() {
                    e.points
                } else {
                    e.test_cases.iter().map(|t| t.points).sum()
                }
            }
            Exercise::Quiz(e) => e.questions.iter().map(|q| q.points).sum(),
            Exercise::Colab(e) => e.points,
        }
    }

    /// Returns a copy safe to ship across the learner-facing boundary:
    /// reference solutions and hidden test bodies are stripped.
    pub fn sanitized(&self) -> Exercise {
        let mut copy = self.clone();
        match &mut copy {
            Exercise::Code(e) => {
                e.solution_code = String::new();
                for test in e.test_cases.iter_mut().filter(|t| t.hidden) {
                    test.test_code = String::new();
                }
            }
            Exercise::Sql(e) => {
                e.solution_query = String::new();
                for test in e.test_cases.iter_mut().filter(|t| t.hidden) {
                    test.test_code = String::new();
                }
            }
            Exercise::Quiz(_) | Exercise::Colab(_) => {}
        }
        copy
    }
}
