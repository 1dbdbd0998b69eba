//! Exercise resolution: assemble an exercise with its declared
//! dependencies from the content store.
//!
//! `resolve` is the targeted lookup. `resolve_with_fallback` layers the
//! broader search policy on top (scan every module of the course for a
//! matching exercise file); the fallback never masks which specific path
//! the targeted lookup failed on.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ContentError;
use crate::exercise::Exercise;

use super::store::ContentStore;

/// An exercise bundled with the raw text of everything it depends on.
#[derive(Debug, Clone)]
pub struct ResolvedExercise {
    pub exercise: Exercise,
    /// Dataset id -> raw tabular text. Consumers index by id; load order
    /// is irrelevant.
    pub datasets: HashMap<String, String>,
    /// Schema DDL text, present for SQL exercises.
    pub schema: Option<String>,
}

impl ResolvedExercise {
    /// The payload shape served across the learner-facing boundary:
    /// solutions stripped, datasets as a plain map.
    pub fn client_payload(&self) -> ClientPayload {
        ClientPayload {
            exercise: self.exercise.sanitized(),
            datasets: self.datasets.clone(),
            schema: self.schema.clone(),
        }
    }
}

/// Learner-facing resolution payload.
#[derive(Debug, Clone, Serialize)]
pub struct ClientPayload {
    pub exercise: Exercise,
    pub datasets: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Loads the exercise at the deterministic (course, module, id) path and
/// every dataset/schema it declares. Any missing document fails the whole
/// resolution with the specific path that was absent.
pub async fn resolve(
    store: &ContentStore,
    course: &str,
    module: &str,
    exercise_id: &str,
) -> Result<ResolvedExercise, ContentError> {
    let exercise = store.load_exercise(course, module, exercise_id).await?;
    assemble(store, exercise).await
}

async fn assemble(
    store: &ContentStore,
    exercise: Exercise,
) -> Result<ResolvedExercise, ContentError> {
    let mut datasets = HashMap::new();
    for reference in exercise.datasets() {
        let text = store.load_dataset(&reference.path).await?;
        datasets.insert(reference.id.clone(), text);
    }

    let schema = match &exercise {
        Exercise::Sql(sql) => Some(store.load_schema(&sql.schema_id).await?),
        _ => None,
    };

    debug!(
        exercise = exercise.id(),
        datasets = datasets.len(),
        has_schema = schema.is_some(),
        "resolved exercise"
    );

    Ok(ResolvedExercise {
        exercise,
        datasets,
        schema,
    })
}

/// Scans every module of a course for an exercise file with the given id.
/// Returns the owning module name alongside the exercise.
pub async fn find_in_course(
    store: &ContentStore,
    course: &str,
    exercise_id: &str,
) -> Result<Option<(String, Exercise)>, ContentError> {
    for module in store.list_modules(course).await? {
        match store.load_exercise(course, &module, exercise_id).await {
            Ok(exercise) => return Ok(Some((module, exercise))),
            Err(ContentError::NotFound { .. }) => continue,
            // A present-but-corrupt document should surface, not be
            // skipped over silently.
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Targeted resolution with the broader-search fallback policy.
///
/// When both the targeted and fallback lookups fail, the returned error
/// echoes the exercise id and carries the targeted lookup's failure.
pub async fn resolve_with_fallback(
    store: &ContentStore,
    course: &str,
    module: &str,
    exercise_id: &str,
) -> Result<ResolvedExercise, ContentError> {
    let direct_err = match resolve(store, course, module, exercise_id).await {
        Ok(resolved) => return Ok(resolved),
        Err(e) => e,
    };

    warn!(
        course,
        module,
        exercise = exercise_id,
        error = %direct_err,
        "targeted resolution failed, scanning course modules"
    );

    match find_in_course(store, course, exercise_id).await {
        Ok(Some((found_module, exercise))) => {
            debug!(module = %found_module, "exercise found by module scan");
            assemble(store, exercise).await
        }
        Ok(None) => Err(ContentError::ExerciseUnresolved {
            exercise_id: exercise_id.to_string(),
            course: course.to_string(),
            direct: Box::new(direct_err),
        }),
        Err(scan_err) => Err(scan_err),
    }
}
