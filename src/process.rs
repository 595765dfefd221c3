use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// One external command: program name plus its argument vector.
/// Arguments are passed to the child as-is, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: String,
    pub arguments: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            program: program.into(),
            arguments,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured streams of a successful run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools. A non-zero exit or a failed launch is always an
/// error; nothing here retries.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Intermediate file written by a tool, removed when the guard drops.
///
/// Arm it just before the command that writes the file, so an early
/// failure never touches a file the job did not produce.
pub struct ScratchFile(PathBuf);

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.0.exists() {
            return;
        }
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(path = %self.0.display(), "removed intermediate"),
            Err(e) => warn!(path = %self.0.display(), error = %e, "could not remove intermediate"),
        }
    }
}

/// Runs invocations as child processes, optionally bounded by a deadline.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        info!(command = %invocation, "running external tool");
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.arguments);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| launch_failure(invocation, e.to_string()))?;
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let started_at = Instant::now();
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| launch_failure(invocation, e.to_string()))?
            {
                break status;
            }
            if let Some(limit) = self.timeout {
                if started_at.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::ExternalToolTimeout {
                        command: invocation.program.clone(),
                        arguments: invocation.arguments.clone(),
                        timeout_ms: limit.as_millis().try_into().unwrap_or(u64::MAX),
                    });
                }
            }
            thread::sleep(Duration::from_millis(20));
        };

        let output = CommandOutput {
            stdout: collect(stdout_rx),
            stderr: collect(stderr_rx),
        };
        debug!(command = %invocation, status = ?status.code(), "external tool finished");
        check_status(invocation, status, output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

fn collect(rx: mpsc::Receiver<Vec<u8>>) -> String {
    let bytes = rx.recv_timeout(Duration::from_millis(500)).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn check_status(invocation: &Invocation, status: ExitStatus, output: CommandOutput) -> Result<CommandOutput> {
    if status.success() {
        return Ok(output);
    }
    let mut captured = output.stderr;
    if captured.trim().is_empty() {
        captured = output.stdout;
    }
    Err(PipelineError::ExternalTool {
        command: invocation.program.clone(),
        arguments: invocation.arguments.clone(),
        status: Some(status.code().unwrap_or(-1)),
        captured_output: captured,
    })
}

fn launch_failure(invocation: &Invocation, reason: String) -> PipelineError {
    PipelineError::ExternalTool {
        command: invocation.program.clone(),
        arguments: invocation.arguments.clone(),
        status: None,
        captured_output: reason,
    }
}
