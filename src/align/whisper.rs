//! Whisper speech model via the `whisper` CLI
//!
//! Each call writes its JSON output into its own scratch directory so that
//! concurrent transcriptions never read each other's files.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::{SpeechModel, TranscriptSegment, WordTimestamp};
use crate::config::TranscriptionConfig;
use crate::error::TranscriptionError;

/// Whisper transcription output format (JSON)
#[derive(Debug, Clone, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    words: Vec<WhisperWord>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    probability: Option<f32>,
}

impl From<WhisperSegment> for TranscriptSegment {
    fn from(seg: WhisperSegment) -> Self {
        let words = (!seg.words.is_empty()).then(|| {
            seg.words
                .into_iter()
                .map(|w| WordTimestamp {
                    word: w.word.trim().to_string(),
                    start: w.start,
                    end: w.end,
                    confidence: w.probability,
                    low_confidence: false,
                })
                .collect()
        });

        Self {
            start: seg.start,
            end: seg.end,
            text: seg.text.trim().to_string(),
            words,
        }
    }
}

/// Whisper CLI transcription engine
pub struct WhisperModel {
    config: TranscriptionConfig,
    scratch_dir: PathBuf,
}

impl WhisperModel {
    #[must_use]
    pub fn new(config: TranscriptionConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn build_args(&self, audio_path: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio_path.to_string_lossy().to_string(),
            "--model".to_string(),
            self.config.model.clone(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--word_timestamps".to_string(),
            "True".to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];

        if self.config.language != "auto" {
            args.push("--language".to_string());
            args.push(self.config.language.clone());
        }

        args.extend(self.config.extra_args.clone());
        args
    }

    async fn run(&self, audio_path: &Path, output_dir: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let args = self.build_args(audio_path, output_dir);
        debug!("Running whisper with args: {:?}", args);

        let child = Command::new(&self.config.whisper_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.timeout(), child)
            .await
            .map_err(|_| TranscriptionError::Timeout(self.config.timeout()))?
            .map_err(|e| TranscriptionError::Model(format!("failed to launch whisper: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Model(format!(
                "whisper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| TranscriptionError::Malformed("audio path has no file name".to_string()))?;
        let json_path = output_dir.join(format!("{stem}.json"));

        let json_content = fs::read_to_string(&json_path).await.map_err(|e| {
            TranscriptionError::Model(format!("whisper output {} unreadable: {e}", json_path.display()))
        })?;

        let segments = parse_whisper_json(&json_content)?;
        Ok(segments)
    }
}

#[async_trait]
impl SpeechModel for WhisperModel {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let output_dir = self.scratch_dir.join(format!("whisper-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&output_dir).await?;

        let result = self.run(audio_path, &output_dir).await;

        // Cleanup
        let _ = fs::remove_dir_all(&output_dir).await;

        result
    }
}

fn parse_whisper_json(content: &str) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
    let output: WhisperOutput = serde_json::from_str(content)?;
    if let Some(ref language) = output.language {
        debug!("Whisper detected language: {language}");
    }
    Ok(output.segments.into_iter().map(TranscriptSegment::from).collect())
}
