//! Interpreter sandbox: lifecycle, execution, and test grading.
//!
//! One sandbox wraps one runtime session. Bootstrap is lazy and happens
//! on the first execution request; a bootstrap failure is terminal for
//! the session and every later request gets a fast unavailability error.
//! Executions are single-flight: an async mutex over the session
//! serializes submissions, so concurrent callers queue rather than
//! interleave inside the shared environment.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::PythonSettings;
use crate::error::SandboxError;
use crate::exercise::{TestCase, TestResult};

use super::provider::{PythonProcessProvider, RuntimeHandle, RuntimeProvider};
use super::{ExecutionResult, SandboxState};

enum Session {
    Uninitialized,
    Ready(Box<dyn RuntimeHandle>),
    /// Terminal: bootstrap failed or the runtime was killed.
    Failed(String),
}

/// Sandbox for interpreted-language submissions.
pub struct PythonSandbox {
    provider: Box<dyn RuntimeProvider>,
    packages: Vec<String>,
    exec_budget: Duration,
    state: std::sync::Mutex<SandboxState>,
    inner: tokio::sync::Mutex<Session>,
}

impl PythonSandbox {
    pub fn new(
        provider: Box<dyn RuntimeProvider>,
        packages: Vec<String>,
        exec_budget: Duration,
    ) -> Self {
        Self {
            provider,
            packages,
            exec_budget,
            state: std::sync::Mutex::new(SandboxState::Uninitialized),
            inner: tokio::sync::Mutex::new(Session::Uninitialized),
        }
    }

    /// Sandbox backed by a local interpreter subprocess, configured from
    /// runtime settings.
    pub fn from_settings(settings: &PythonSettings) -> Self {
        Self::new(
            Box::new(PythonProcessProvider::new(
                settings.interpreter.clone(),
                settings.bootstrap_budget(),
            )),
            settings.default_packages.clone(),
            settings.exec_budget(),
        )
    }

    /// Current lifecycle state, observable without touching the session.
    pub fn state(&self) -> SandboxState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: SandboxState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Runs a submission against the shared environment.
    ///
    /// A fault in the submitted code is a non-throwing result; `Err` is
    /// reserved for the sandbox itself being unusable.
    pub async fn run_code(&self, source: &str) -> Result<ExecutionResult, SandboxError> {
        let mut session = self.inner.lock().await;
        self.exec_locked(&mut session, source).await
    }

    /// Runs a submission, then each test case in declaration order
    /// against the environment the submission left behind.
    ///
    /// Tests are independent: one failing test does not stop the rest.
    /// If the submission itself fails, no tests run and the result
    /// carries no test outcomes.
    pub async fn run_tests(
        &self,
        source: &str,
        tests: &[TestCase],
    ) -> Result<ExecutionResult, SandboxError> {
        let mut session = self.inner.lock().await;
        let mut result = self.exec_locked(&mut session, source).await?;
        if !result.success {
            return Ok(result);
        }

        let mut outcomes = Vec::with_capacity(tests.len());
        let mut all_passed = true;
        let mut runtime_dead = false;

        for case in tests {
            if runtime_dead {
                all_passed = false;
                outcomes.push(TestResult {
                    test_id: case.id.clone(),
                    passed: false,
                    points_earned: 0,
                    error_message: case
                        .failure_message(Some("Runtime terminated before this test ran".into())),
                    execution_time_ms: None,
                });
                continue;
            }

            let exec = self.exec_locked(&mut session, &case.test_code).await?;
            if exec.timed_out {
                runtime_dead = true;
            }

            let passed = exec.success;
            all_passed &= passed;
            outcomes.push(TestResult {
                test_id: case.id.clone(),
                passed,
                points_earned: if passed { case.points } else { 0 },
                error_message: if passed {
                    None
                } else {
                    case.failure_message(exec.error)
                },
                execution_time_ms: Some(exec.execution_time_ms),
            });
            result.execution_time_ms += exec.execution_time_ms;
        }

        debug!(
            total = tests.len(),
            passed = outcomes.iter().filter(|t| t.passed).count(),
            "test run finished"
        );

        result.success = all_passed;
        result.test_results = Some(outcomes);
        Ok(result)
    }

    /// Clears learner-defined names while keeping the runtime warm.
    pub async fn reset(&self) -> Result<(), SandboxError> {
        let mut session = self.inner.lock().await;
        match &mut *session {
            Session::Ready(handle) => handle.clear().await,
            _ => Ok(()),
        }
    }

    async fn exec_locked(
        &self,
        session: &mut Session,
        source: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let handle = self.ensure_ready(session).await?;

        let imports = sniff_imports(source);
        if !imports.is_empty() {
            // Preload is best-effort: a missing package surfaces as an
            // import error in the execution itself.
            if let Err(e) = handle.preload(&imports).await {
                warn!(error = %e, "package preload failed");
            }
        }

        let started = Instant::now();
        let raw = handle.exec(source, self.exec_budget).await?;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        if raw.timed_out {
            warn!("submission exceeded its budget; runtime killed");
            *session = Session::Failed("runtime killed after exceeding its budget".to_string());
            self.set_state(SandboxState::Error);
        }

        Ok(ExecutionResult {
            success: raw.ok,
            stdout: raw.stdout.trim().to_string(),
            stderr: raw.stderr.trim().to_string(),
            error: raw.error,
            timed_out: raw.timed_out,
            execution_time_ms,
            test_results: None,
        })
    }

    async fn ensure_ready<'a>(
        &self,
        session: &'a mut Session,
    ) -> Result<&'a mut Box<dyn RuntimeHandle>, SandboxError> {
        match session {
            Session::Failed(reason) => {
                return Err(SandboxError::Unavailable(reason.clone()));
            }
            Session::Uninitialized => {
                self.set_state(SandboxState::Bootstrapping);
                match self.provider.bootstrap(&self.packages).await {
                    Ok(handle) => {
                        info!("runtime session ready");
                        *session = Session::Ready(handle);
                        self.set_state(SandboxState::Ready);
                    }
                    Err(e) => {
                        *session = Session::Failed(e.to_string());
                        self.set_state(SandboxState::Error);
                        return Err(e);
                    }
                }
            }
            Session::Ready(_) => {}
        }

        match session {
            Session::Ready(handle) => Ok(handle),
            _ => Err(SandboxError::Unavailable(
                "runtime session is not ready".to_string(),
            )),
        }
    }
}

/// Extracts top-level module names from import statements, preserving
/// first-seen order.
fn sniff_imports(source: &str) -> Vec<String> {
    static IMPORT_LINE: OnceLock<Regex> = OnceLock::new();
    let pattern = IMPORT_LINE.get_or_init(|| {
        Regex::new(r"^(?:from|import)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap_or_else(|e| panic!("invalid import pattern: {e}"))
    });

    let mut names = Vec::new();
    for line in source.lines() {
        if let Some(captures) = pattern.captures(line.trim_start()) {
            let name = captures[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::super::provider::testing::ScriptedProvider;
    use super::*;

    fn sandbox() -> PythonSandbox {
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

    #[tokio::test]
    async fn test_run_code_captures_stdout() {
        let sandbox = sandbox();
        let result = sandbox.run_code("print hello\nprint world").await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "hello\nworld");
        assert!(result.test_results.is_none());
    }

    #[tokio::test]
    async fn test_code_fault_is_not_an_error() {
        let sandbox = sandbox();
        let result = sandbox.run_code("raise ValueError('nope')").await.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("ValueError"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_failing_code_skips_tests() {
        let sandbox = sandbox();
        let result = sandbox
            .run_tests("raise RuntimeError", &[case("t1", "print ok", 5)])
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.test_results.is_none());
    }

    #[tokio::test]
    async fn test_tests_run_independently() {
        let sandbox = sandbox();
        let cases = vec![
            case("t1", "print a", 3),
            case("t2", "raise AssertionError", 4),
            case("t3", "print c", 5),
        ];
        let result = sandbox.run_tests("print setup", &cases).await.unwrap();

        assert!(!result.success);
        let outcomes = result.test_results.as_deref().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
        assert!(outcomes[2].passed);
        assert_eq!(result.points_earned(), 8);
    }

    #[tokio::test]
    async fn test_failure_messages_respect_visibility() {
        let sandbox = sandbox();
        let mut custom = case("t1", "raise AssertionError", 2);
        custom.error_message = Some("Check your loop bounds".to_string());
        let mut hidden = case("t2", "raise AssertionError", 2);
        hidden.hidden = true;

        let result = sandbox
            .run_tests("print setup", &[custom, hidden])
            .await
            .unwrap();
        let outcomes = result.test_results.as_deref().unwrap();
        assert_eq!(outcomes[0].error_message.as_deref(), Some("Check your loop bounds"));
        assert!(outcomes[1].error_message.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_terminal() {
        let sandbox = PythonSandbox::new(
            Box::new(ScriptedProvider::failing()),
            vec![],
            Duration::from_secs(5),
        );

        let first = sandbox.run_code("print hi").await.unwrap_err();
        assert!(matches!(first, SandboxError::Bootstrap(_)));
        assert_eq!(sandbox.state(), SandboxState::Error);

        // Later requests fail fast without re-bootstrapping.
        let second = sandbox.run_code("print hi").await.unwrap_err();
        assert!(matches!(second, SandboxError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_session() {
        let sandbox = sandbox();
        let result = sandbox.run_code("loop_forever()").await.unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(sandbox.state(), SandboxState::Error);

        let after = sandbox.run_code("print hi").await.unwrap_err();
        assert!(matches!(after, SandboxError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_mid_tests_fails_the_remainder() {
        let sandbox = sandbox();
        let cases = vec![
            case("t1", "print a", 1),
            case("t2", "loop_forever()", 1),
            case("t3", "print c", 1),
        ];
        let result = sandbox.run_tests("print setup", &cases).await.unwrap();
        let outcomes = result.test_results.as_deref().unwrap();
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
        assert!(!outcomes[2].passed);
        assert!(outcomes[2].execution_time_ms.is_none());
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let sandbox = sandbox();
        assert_eq!(sandbox.state(), SandboxState::Uninitialized);
        sandbox.run_code("print hi").await.unwrap();
        assert_eq!(sandbox.state(), SandboxState::Ready);
    }

    #[test]
    fn test_sniff_imports() {
        let names = sniff_imports(
            "import numpy as np\nfrom pandas import DataFrame\nx = 1\n  import os.path\nimport numpy",
        );
        assert_eq!(names, vec!["numpy", "pandas", "os"]);
    }

    #[test]
    fn test_sniff_imports_ignores_non_imports() {
        assert!(sniff_imports("x = 'import fake'").is_empty());
    }
}
