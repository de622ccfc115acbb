//! Word-level alignment of narration audio
//!
//! - **Speech model** - Whisper (via CLI subprocess) behind [`SpeechModel`]
//! - **Fallback** - proportional distribution when a segment has no word timings
//! - **Probe** - audio duration via ffprobe behind [`MediaProbe`]

pub mod distribute;
pub mod probe;
pub mod whisper;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TranscriptionConfig;
use crate::error::TranscriptionError;

pub use distribute::{distribute_proportionally, enforce_monotonic};
pub use probe::{FfprobeProbe, MediaProbe};
pub use whisper::WhisperModel;

/// A single word's position in the narration audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Confidence fell below the configured threshold
    #[serde(default)]
    pub low_confidence: bool,
}

impl WordTimestamp {
    #[must_use]
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            confidence: None,
            low_confidence: false,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Raw speech model output: a segment with optional word timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTimestamp>>,
}

impl TranscriptSegment {
    /// Word timings usable as-is: present, non-empty, finite and ordered within themselves.
    fn usable_words(&self) -> Option<&[WordTimestamp]> {
        let words = self.words.as_deref()?;
        let usable = !words.is_empty()
            && words.iter().all(|w| {
                w.start.is_finite() && w.end.is_finite() && w.end >= w.start && !w.word.trim().is_empty()
            });
        usable.then_some(words)
    }
}

/// Anything that turns an audio file into timed segments
#[async_trait]
pub trait SpeechModel: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError>;
}

/// Produces a monotonic word timeline from a [`SpeechModel`]
pub struct Aligner {
    model: Arc<dyn SpeechModel>,
    confidence_threshold: f32,
    word_count_tolerance: f64,
}

impl Aligner {
    pub fn new(model: Arc<dyn SpeechModel>, config: &TranscriptionConfig) -> Self {
        Self {
            model,
            confidence_threshold: config.confidence_threshold,
            word_count_tolerance: config.word_count_tolerance,
        }
    }

    /// Align narration audio to word timestamps.
    ///
    /// `narration_text` is only used as a word-count sanity check.
    pub async fn align(
        &self,
        audio_path: &Path,
        narration_text: &str,
    ) -> Result<Vec<WordTimestamp>, TranscriptionError> {
        check_readable(audio_path).await?;

        let segments = self.model.transcribe(audio_path).await?;
        if segments.is_empty() {
            return Err(TranscriptionError::NoSegments);
        }

        let mut words = Vec::new();
        for segment in &segments {
            if !(segment.start.is_finite() && segment.end.is_finite()) || segment.end < segment.start {
                return Err(TranscriptionError::Malformed(format!(
                    "segment window [{}, {}]",
                    segment.start, segment.end
                )));
            }

            if let Some(timed) = segment.usable_words() {
                words.extend(timed.iter().cloned().map(|mut w| {
                    w.word = w.word.trim().to_string();
                    w
                }));
            } else {
                debug!(
                    "No word timings for segment [{:.2}, {:.2}], distributing proportionally",
                    segment.start, segment.end
                );
                words.extend(distribute_proportionally(segment.start, segment.end, &segment.text));
            }
        }

        if words.is_empty() {
            return Err(TranscriptionError::Malformed(
                "segments contained no words".to_string(),
            ));
        }

        enforce_monotonic(&mut words);

        for word in &mut words {
            word.low_confidence = word
                .confidence
                .is_some_and(|c| c < self.confidence_threshold);
        }

        self.cross_check(audio_path, narration_text, words.len());

        Ok(words)
    }

    fn cross_check(&self, audio_path: &Path, narration_text: &str, aligned: usize) {
        let expected = narration_text.split_whitespace().count();
        if expected == 0 {
            return;
        }

        let deviation = (aligned as f64 - expected as f64).abs() / expected as f64;
        if deviation > self.word_count_tolerance {
            warn!(
                audio = %audio_path.display(),
                expected,
                aligned,
                "Aligned word count deviates {:.0}% from narration text",
                deviation * 100.0
            );
        }
    }
}

async fn check_readable(audio_path: &Path) -> Result<(), TranscriptionError> {
    let unreadable = |reason: String| TranscriptionError::AudioUnreadable {
        path: audio_path.to_path_buf(),
        reason,
    };

    let meta = tokio::fs::metadata(audio_path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;

    if !meta.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    if meta.len() == 0 {
        return Err(unreadable("file is empty".to_string()));
    }
    Ok(())
}
