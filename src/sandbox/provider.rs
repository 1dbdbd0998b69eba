//! Pluggable runtime providers for the interpreter sandbox.
//!
//! The sandbox state machine never talks to a concrete runtime directly;
//! it asks a [`RuntimeProvider`] to bootstrap a [`RuntimeHandle`] and
//! drives everything through that seam. Swapping the provider swaps the
//! execution substrate (subprocess interpreter, WASM-embedded
//! interpreter, OS-level sandbox) without touching the state machine or
//! the orchestration contract.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::SandboxError;

use super::bridge::{BridgeError, DriverBridge, DriverRequest};

/// Raw outcome of one source execution inside the runtime.
#[derive(Debug, Clone)]
pub struct RawExecution {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    /// The execution was killed for exceeding its wall-clock budget. The
    /// handle is dead afterwards.
    pub timed_out: bool,
}

/// Fetches and initializes a sandboxed execution runtime.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    /// Starts the runtime and preloads the requested packages. A failure
    /// here is a bootstrap failure; the caller treats it as terminal for
    /// the session.
    async fn bootstrap(&self, packages: &[String]) -> Result<Box<dyn RuntimeHandle>, SandboxError>;
}

/// A live, exclusively-owned runtime session.
#[async_trait]
pub trait RuntimeHandle: Send {
    /// Executes source as a complete program against the live
    /// environment, capturing stdout/stderr. User-code faults come back
    /// inside [`RawExecution`]; only transport-level faults are errors.
    async fn exec(&mut self, source: &str, budget: Duration) -> Result<RawExecution, SandboxError>;

    /// Best-effort package preload; unknown packages are ignored.
    async fn preload(&mut self, packages: &[String]) -> Result<(), SandboxError>;

    /// Clears learner-defined names without restarting the runtime.
    async fn clear(&mut self) -> Result<(), SandboxError>;

    /// Tears the runtime down.
    async fn shutdown(self: Box<Self>);
}

/// Driver program executed inside the Python subprocess.
///
/// Speaks one JSON frame per line on stdin/stdout. User code runs in a
/// shared globals dict so test snippets see everything the submission
/// defined; stdout/stderr are captured per exec via redirection, while
/// protocol frames go to the real stdout.
const PYTHON_DRIVER: &str = r#"
import importlib
import io
import json
import sys
import traceback
from contextlib import redirect_stderr, redirect_stdout

env = {"__name__": "__main__"}


def reply(payload):
    sys.__stdout__.write(json.dumps(payload) + "\n")
    sys.__stdout__.flush()


for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        request = json.loads(line)
    except ValueError:
        reply({"ok": False, "error": "malformed request frame"})
        continue

    op = request.get("op")
    if op == "ping":
        reply({"ok": True})
    elif op == "preload":
        for name in request.get("packages", []):
            try:
                importlib.import_module(name)
            except Exception:
                pass
        reply({"ok": True})
    elif op == "reset":
        env.clear()
        env["__name__"] = "__main__"
        reply({"ok": True})
    elif op == "exec":
        out, err = io.StringIO(), io.StringIO()
        ok, message = True, None
        try:
            with redirect_stdout(out), redirect_stderr(err):
                exec(compile(request.get("code", ""), "<exercise>", "exec"), env)
        except BaseException as exc:
            ok = False
            message = "".join(
                traceback.format_exception_only(type(exc), exc)
            ).strip()
        reply(
            {
                "ok": ok,
                "stdout": out.getvalue(),
                "stderr": err.getvalue(),
                "error": message,
            }
        )
    else:
        reply({"ok": False, "error": "unknown op"})
"#;

/// Default provider: a local Python interpreter running the embedded
/// driver program.
pub struct PythonProcessProvider {
    interpreter: String,
    bootstrap_budget: Duration,
}

impl PythonProcessProvider {
    pub fn new(interpreter: impl Into<String>, bootstrap_budget: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            bootstrap_budget,
        }
    }
}

impl Default for PythonProcessProvider {
    fn default() -> Self {
        Self::new("python3", Duration::from_secs(60))
    }
}

#[async_trait]
impl RuntimeProvider for PythonProcessProvider {
    async fn bootstrap(&self, packages: &[String]) -> Result<Box<dyn RuntimeHandle>, SandboxError> {
        info!(interpreter = %self.interpreter, "bootstrapping python runtime");

        let mut bridge = DriverBridge::spawn(&self.interpreter, &["-u", "-c", PYTHON_DRIVER])
            .map_err(|e| SandboxError::Bootstrap(e.to_string()))?;

        // The ping doubles as the readiness barrier: the driver only
        // answers once its loop is up.
        bridge
            .request(&DriverRequest::Ping, self.bootstrap_budget)
            .await
            .map_err(|e| SandboxError::Bootstrap(format!("driver did not come up: {e}")))?;

        if !packages.is_empty() {
            debug!(?packages, "preloading default packages");
            bridge
                .request(
                    &DriverRequest::Preload { packages },
                    self.bootstrap_budget,
                )
                .await
                .map_err(|e| SandboxError::Bootstrap(format!("package preload failed: {e}")))?;
        }

        Ok(Box::new(PythonProcessHandle { bridge }))
    }
}

struct PythonProcessHandle {
    bridge: DriverBridge,
}

#[async_trait]
impl RuntimeHandle for PythonProcessHandle {
    async fn exec(&mut self, source: &str, budget: Duration) -> Result<RawExecution, SandboxError> {
        match self
            .bridge
            .request(&DriverRequest::Exec { code: source }, budget)
            .await
        {
            Ok(response) => Ok(RawExecution {
                ok: response.ok,
                stdout: response.stdout,
                stderr: response.stderr,
                error: response.error,
                timed_out: false,
            }),
            Err(BridgeError::Timeout) => Ok(RawExecution {
                ok: false,
                stdout: String::new(),
                stderr: String::new(),
                error: Some("Execution exceeded its wall-clock budget and was terminated".into()),
                timed_out: true,
            }),
            Err(e) => Err(SandboxError::Bridge(e)),
        }
    }

    async fn preload(&mut self, packages: &[String]) -> Result<(), SandboxError> {
        self.bridge
            .request(
                &DriverRequest::Preload { packages },
                Duration::from_secs(60),
            )
            .await
            .map(|_| ())
            .map_err(SandboxError::Bridge)
    }

    async fn clear(&mut self) -> Result<(), SandboxError> {
        self.bridge
            .request(&DriverRequest::Reset, Duration::from_secs(10))
            .await
            .map(|_| ())
            .map_err(SandboxError::Bridge)
    }

    async fn shutdown(self: Box<Self>) {
        let _ = self.bridge.close().await;
    }
}
