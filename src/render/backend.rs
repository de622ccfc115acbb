//! External renderer process management.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::RenderInstruction;
use crate::error::RenderError;

/// Lines of renderer stderr kept as diagnostics
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Diagnostic fragments marking a fault worth retrying
const TRANSIENT_MARKERS: &[&str] = &[
    "resource busy",
    "resource temporarily unavailable",
    "temporarily unavailable",
    "cannot allocate memory",
    "out of memory",
    "connection reset",
    "broken pipe",
    "eagain",
];

/// Anything that can execute a [`RenderInstruction`]
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn execute(&self, instruction: &RenderInstruction) -> Result<(), RenderError>;
}

/// Runs the instruction as a child process under a timeout
pub struct FfmpegBackend {
    timeout: Duration,
}

impl FfmpegBackend {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RenderBackend for FfmpegBackend {
    async fn execute(&self, instruction: &RenderInstruction) -> Result<(), RenderError> {
        debug!("ffmpeg args: {:?}", instruction.args);

        let child = Command::new(&instruction.program)
            .args(&instruction.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the timed-out future kills the child
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))?
            .map_err(RenderError::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("ffmpeg: {}", line);
        }

        if output.status.success() {
            return Ok(());
        }

        let diagnostics = stderr_tail(&stderr, DIAGNOSTIC_TAIL_LINES);
        Err(RenderError::Failed {
            status: output.status.to_string(),
            transient: is_transient(output.status, &diagnostics),
            diagnostics,
        })
    }
}

/// Whether a failed exit looks like a resource problem rather than bad input.
fn is_transient(status: ExitStatus, diagnostics: &str) -> bool {
    // No exit code means the process was killed by a signal
    if status.code().is_none() {
        return true;
    }
    let lower = diagnostics.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}
