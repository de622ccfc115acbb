//! Media duration probing via ffprobe.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::TranscriptionError;

/// Reads the playable duration of a media file
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration in seconds
    async fn duration(&self, path: &Path) -> Result<f64, TranscriptionError>;
}

/// ffprobe-backed [`MediaProbe`]
pub struct FfprobeProbe {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration(&self, path: &Path) -> Result<f64, TranscriptionError> {
        let unreadable = |reason: String| TranscriptionError::AudioUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| TranscriptionError::Timeout(self.timeout))?
            .map_err(|e| unreadable(format!("failed to launch ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(unreadable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout)).map_err(unreadable)
    }
}

fn parse_duration(stdout: &str) -> Result<f64, String> {
    let line = stdout.lines().next().unwrap_or("").trim();
    let seconds: f64 = line
        .parse()
        .map_err(|_| format!("ffprobe reported no duration ({line:?})"))?;

    if seconds.is_finite() && seconds > 0.0 {
        Ok(seconds)
    } else {
        Err(format!("ffprobe reported invalid duration {seconds}"))
    }
}
