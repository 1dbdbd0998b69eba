//! JSON-lines bridge to the interpreter driver subprocess.
//!
//! The bridge owns the child process and its stdio pipes. Requests go out
//! as single-line JSON frames on stdin; the driver answers with exactly
//! one JSON frame per request on stdout. A request that exceeds its
//! budget kills the child, which is the timeout enforcement for runaway
//! submissions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::debug;

/// Errors on the runtime communication channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to spawn runtime process: {0}")]
    SpawnFailed(String),

    #[error("Runtime process exited unexpectedly with code {0}")]
    ProcessExited(i32),

    #[error("Runtime operation exceeded its budget")]
    Timeout,

    #[error("I/O error on runtime channel: {0}")]
    Io(String),

    #[error("Malformed driver frame: {0}")]
    Protocol(String),
}

/// One request frame sent to the driver.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverRequest<'a> {
    /// Liveness probe; the driver answers immediately.
    Ping,
    /// Execute source in the shared environment, capturing output.
    Exec { code: &'a str },
    /// Best-effort import of the named packages; missing packages are
    /// ignored by the driver.
    Preload { packages: &'a [String] },
    /// Clear all learner-defined names without restarting the runtime.
    Reset,
}

/// One response frame from the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverResponse {
    pub ok: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Owns the driver subprocess and serializes request/response exchanges.
pub struct DriverBridge {
    process: Child,
    stdin: ChildStdin,
    stdout_reader: BufReader<ChildStdout>,
}

impl DriverBridge {
    /// Spawns the driver process with piped stdio.
    pub fn spawn(cmd: &str, args: &[&str]) -> Result<Self, BridgeError> {
        let mut process = Command::new(cmd)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::SpawnFailed(e.to_string()))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| BridgeError::SpawnFailed("failed to capture stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| BridgeError::SpawnFailed("failed to capture stdout".to_string()))?;

        debug!(pid = process.id(), "driver process spawned");

        Ok(Self {
            process,
            stdin,
            stdout_reader: BufReader::new(stdout),
        })
    }

    /// Sends one request and waits for its response frame.
    ///
    /// On timeout the child is killed and [`BridgeError::Timeout`] is
    /// returned; the bridge is unusable afterwards.
    pub async fn request(
        &mut self,
        request: &DriverRequest<'_>,
        budget: Duration,
    ) -> Result<DriverResponse, BridgeError> {
        let frame =
            serde_json::to_string(request).map_err(|e| BridgeError::Protocol(e.to_string()))?;

        let exchange = async {
            self.send_line(&frame).await?;
            self.receive_line().await
        };

        match timeout(budget, exchange).await {
            Ok(Ok(line)) => serde_json::from_str(&line)
                .map_err(|e| BridgeError::Protocol(format!("{e}: {line}"))),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = self.process.start_kill();
                Err(BridgeError::Timeout)
            }
        }
    }

    /// Writes one line to the driver's stdin.
    pub async fn send_line(&mut self, line: &str) -> Result<(), BridgeError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))
    }

    /// Reads one line from the driver's stdout. EOF means the process
    /// died, reported with its exit code.
    pub async fn receive_line(&mut self) -> Result<String, BridgeError> {
        let mut line = String::new();
        let bytes_read = self
            .stdout_reader
            .read_line(&mut line)
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;

        if bytes_read == 0 {
            let code = self
                .process
                .try_wait()
                .ok()
                .flatten()
                .and_then(|status| status.code())
                .unwrap_or(-1);
            return Err(BridgeError::ProcessExited(code));
        }

        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// True while the subprocess has not exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Closes stdin and waits briefly for a graceful exit, then kills.
    pub async fn close(mut self) -> Result<(), BridgeError> {
        self.stdin
            .shutdown()
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;

        match timeout(Duration::from_secs(5), self.process.wait()).await {
            Ok(Ok(_status)) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::Io(e.to_string())),
            Err(_) => self
                .process
                .kill()
                .await
                .map_err(|e| BridgeError::Io(format!("failed to kill driver: {e}"))),
        }
    }
}

impl Drop for DriverBridge {
    fn drop(&mut self) {
        // Cannot await in drop; begin the kill and let the runtime reap it.
        let _ = self.process.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frames_are_single_line_json() {
        let frame = serde_json::to_string(&DriverRequest::Exec {
            code: "print('hi')\nprint('there')",
        })
        .unwrap();
        assert!(!frame.contains('\n'));
        assert!(frame.starts_with("{\"op\":\"exec\""));

        let packages = vec!["numpy".to_string()];
        let frame = serde_json::to_string(&DriverRequest::Preload {
            packages: &packages,
        })
        .unwrap();
        assert_eq!(frame, "{\"op\":\"preload\",\"packages\":[\"numpy\"]}");

        assert_eq!(
            serde_json::to_string(&DriverRequest::Ping).unwrap(),
            "{\"op\":\"ping\"}"
        );
    }

    #[test]
    fn test_response_defaults() {
        let response: DriverResponse = serde_json::from_str("{\"ok\":true}").unwrap();
        assert!(response.ok);
        assert!(response.stdout.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let result = DriverBridge::spawn("/nonexistent/interpreter", &[]);
        assert!(matches!(result, Err(BridgeError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_send_receive_line_round_trip() {
        // cat echoes lines back verbatim.
        let mut bridge = DriverBridge::spawn("cat", &[]).expect("failed to spawn cat");
        bridge.send_line("hello driver").await.expect("send failed");
        let line = bridge.receive_line().await.expect("receive failed");
        assert_eq!(line, "hello driver");
        let _ = bridge.close().await;
    }

    #[tokio::test]
    async fn test_eof_reports_process_exit() {
        let mut bridge = DriverBridge::spawn("true", &[]).expect("failed to spawn");
        let err = bridge.receive_line().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessExited(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_child() {
        // sleep never produces a response line, so the budget expires.
        let mut bridge = DriverBridge::spawn("sleep", &["30"]).expect("failed to spawn sleep");
        let err = bridge
            .request(&DriverRequest::Ping, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout));
    }

    #[tokio::test]
    async fn test_is_running() {
        let mut bridge = DriverBridge::spawn("cat", &[]).expect("failed to spawn cat");
        assert!(bridge.is_running());
        let _ = bridge.close().await;
    }
}
