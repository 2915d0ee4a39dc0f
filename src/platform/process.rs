//! Subprocess execution with a bounded wait.

use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// Errors from running a helper process.
#[derive(Debug)]
pub enum ProcessError {
    Runtime(String),
    Spawn(String),
    Wait(String),
    TimedOut(Duration),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Runtime(e) => write!(f, "Could not create runtime: {e}"),
            ProcessError::Spawn(e) => write!(f, "Could not start process: {e}"),
            ProcessError::Wait(e) => write!(f, "Could not wait for process: {e}"),
            ProcessError::TimedOut(t) => write!(f, "Process timed out after {}ms", t.as_millis()),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Blocking wrapper over [`output_with_timeout`] for the synchronous
/// platform and OCR code.
pub fn run_with_timeout(command: Command, timeout: Duration) -> Result<Output, ProcessError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ProcessError::Runtime(e.to_string()))?;

    runtime.block_on(output_with_timeout(command.into(), timeout))
}

/// Collect the output of `command`; the child is killed when the deadline passes.
pub async fn output_with_timeout(
    mut command: tokio::process::Command,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| ProcessError::Spawn(e.to_string()))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ProcessError::Wait(e.to_string())),
        Err(_) => Err(ProcessError::TimedOut(timeout)),
    }
}
