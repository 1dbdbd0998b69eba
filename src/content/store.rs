//! File-tree content store.
//!
//! Layout, rooted at the content directory:
//!
//! ```text
//! courses/{course}/course.yaml
//! courses/{course}/{module}/module.yaml
//! courses/{course}/{module}/{lesson}.md
//! courses/{course}/{module}/exercises/{exerciseId}.yaml
//! shared/datasets/{path}
//! shared/schemas/{schemaId}.sql
//! ```
//!
//! Every read goes back to disk; the store does no caching of its own.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ContentError;
use crate::exercise::Exercise;

/// Course metadata document (`course.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub modules: Vec<ModuleReference>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Entry in a course's module list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReference {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: u32,
}

/// Module metadata document (`module.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub lessons: Vec<LessonReference>,
    #[serde(default)]
    pub exercises: Vec<ExerciseReference>,
}

/// Entry in a module's lesson list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonReference {
    pub id: String,
    pub file: String,
    pub title: String,
    #[serde(default)]
    pub order: u32,
}

/// Entry in a module's exercise list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseReference {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
}

/// Read access to a content tree on disk.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn courses_root(&self) -> PathBuf {
        self.root.join("courses")
    }

    /// Deterministic path of an exercise definition document.
    pub fn exercise_path(&self, course: &str, module: &str, exercise_id: &str) -> PathBuf {
        self.courses_root()
            .join(course)
            .join(module)
            .join("exercises")
            .join(format!("{exercise_id}.yaml"))
    }

    async fn read_text(&self, path: &Path) -> Result<String, ContentError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContentError::NotFound {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(ContentError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    async fn read_yaml<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<T, ContentError> {
        let text = self.read_text(path).await?;
        serde_yaml::from_str(&text).map_err(|e| ContentError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub async fn load_exercise(
        &self,
        course: &str,
        module: &str,
        exercise_id: &str,
    ) -> Result<Exercise, ContentError> {
        let path = self.exercise_path(course, module, exercise_id);
        debug!(path = %path.display(), "loading exercise definition");
        self.read_yaml(&path).await
    }

    /// Raw tabular text of a shared dataset, by its declared storage path.
    pub async fn load_dataset(&self, dataset_path: &str) -> Result<String, ContentError> {
        let path = self.root.join("shared").join("datasets").join(dataset_path);
        self.read_text(&path).await
    }

    /// DDL text of a shared SQL schema document.
    pub async fn load_schema(&self, schema_id: &str) -> Result<String, ContentError> {
        let path = self
            .root
            .join("shared")
            .join("schemas")
            .join(format!("{schema_id}.sql"));
        self.read_text(&path).await
    }

    pub async fn load_course(&self, course: &str) -> Result<CourseConfig, ContentError> {
        let path = self.courses_root().join(course).join("course.yaml");
        self.read_yaml(&path).await
    }

    pub async fn load_module(
        &self,
        course: &str,
        module: &str,
    ) -> Result<ModuleConfig, ContentError> {
        let path = self
            .courses_root()
            .join(course)
            .join(module)
            .join("module.yaml");
        self.read_yaml(&path).await
    }

    pub async fn load_lesson(
        &self,
        course: &str,
        module: &str,
        lesson_file: &str,
    ) -> Result<String, ContentError> {
        let path = self.courses_root().join(course).join(module).join(lesson_file);
        self.read_text(&path).await
    }

    /// Names of all course directories.
    pub async fn list_courses(&self) -> Result<Vec<String>, ContentError> {
        self.list_dirs(&self.courses_root(), |_| true).await
    }

    /// Names of a course's module directories, sorted.
    pub async fn list_modules(&self, course: &str) -> Result<Vec<String>, ContentError> {
        let mut modules = self
            .list_dirs(&self.courses_root().join(course), |name| {
                name.starts_with("module-")
            })
            .await?;
        modules.sort();
        Ok(modules)
    }

    async fn list_dirs(
        &self,
        path: &Path,
        keep: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>, ContentError> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ContentError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(ContentError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let mut names = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(ContentError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            };
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}
