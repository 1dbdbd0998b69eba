//! Exercise data model: variants, test cases, and progress shapes.

pub mod progress;
pub mod types;

pub use progress::{ExerciseProgress, ExerciseStatus, ProgressDelta, TestResult};
pub use types::{
    CodeExercise, ColabExercise, DatasetReference, Difficulty, Exercise, QuizExercise,
    QuizOption, QuizQuestion, SqlExercise, TestCase,
};
