//! Error taxonomy for the composition engine.
//!
//! Only [`ConfigError`] is fatal to a batch run. Everything that can go wrong
//! with a single narration job is a [`JobError`], which the orchestrator turns
//! into a failed [`JobResult`](crate::render::JobResult) tagged with an
//! [`ErrorClass`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid or unreadable configuration. Aborts the run before any job starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid jobs file {path}: {reason}")]
    Jobs { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which required asset a [`JobError::MissingAsset`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Background,
    Avatar,
    Screenshot,
    Audio,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Background => "background",
            Self::Avatar => "avatar",
            Self::Screenshot => "screenshot",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Alignment failures. Deterministic, so never retried.
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("audio {path} is unreadable: {reason}")]
    AudioUnreadable { path: PathBuf, reason: String },

    #[error("speech model produced no segments")]
    NoSegments,

    #[error("speech model output is malformed: {0}")]
    Malformed(String),

    #[error("speech model failed: {0}")]
    Model(String),

    #[error("speech model timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// External renderer failures.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("renderer exited with {status}: {diagnostics}")]
    Failed {
        status: String,
        diagnostics: String,
        transient: bool,
    },

    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to launch renderer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to prepare render inputs: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("failed to finalize output: {0}")]
    Finalize(#[source] std::io::Error),
}

impl RenderError {
    /// Whether another attempt has a reasonable chance of succeeding.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Failed { transient, .. } => *transient,
            Self::Timeout(_) => true,
            Self::Spawn(_) | Self::Prepare(_) | Self::Finalize(_) => false,
        }
    }
}

/// Anything that fails a single job without touching its siblings.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("missing {kind} asset: {}", .path.display())]
    MissingAsset { kind: AssetKind, path: PathBuf },

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("invalid render spec: {0}")]
    InvalidSpec(String),

    #[error("job task aborted: {0}")]
    Internal(String),
}

impl JobError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingAsset { .. } => ErrorClass::MissingAsset,
            Self::Transcription(_) => ErrorClass::Transcription,
            Self::Render(_) => ErrorClass::Render,
            Self::InvalidSpec(_) => ErrorClass::InvalidSpec,
            Self::Internal(_) => ErrorClass::Internal,
        }
    }
}

/// Classification tag persisted in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    MissingAsset,
    Transcription,
    Render,
    InvalidSpec,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingAsset => "MissingAssetError",
            Self::Transcription => "TranscriptionError",
            Self::Render => "RenderError",
            Self::InvalidSpec => "InvalidSpecError",
            Self::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_render_errors() {
        let busy = RenderError::Failed {
            status: "exit status: 1".to_string(),
            diagnostics: "Device or resource busy".to_string(),
            transient: true,
        };
        assert!(busy.is_transient());
        assert!(RenderError::Timeout(Duration::from_secs(1)).is_transient());

        let crashed = RenderError::Failed {
            status: "exit status: 1".to_string(),
            diagnostics: "Invalid data found when processing input".to_string(),
            transient: false,
        };
        assert!(!crashed.is_transient());
        let gone = std::io::Error::new(std::io::ErrorKind::NotFound, "ffmpeg");
        assert!(!RenderError::Spawn(gone).is_transient());

        let err = JobError::from(RenderError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.class(), ErrorClass::Render);
        assert_eq!(
            JobError::from(TranscriptionError::NoSegments).class(),
            ErrorClass::Transcription
        );
    }

    #[test]
    fn test_error_class_tags() {
        let err = JobError::MissingAsset {
            kind: AssetKind::Background,
            path: PathBuf::from("bg.mp4"),
        };
        assert_eq!(err.class(), ErrorClass::MissingAsset);
        assert_eq!(err.class().to_string(), "MissingAssetError");
        assert!(err.to_string().contains("missing background asset"));

        let json = serde_json::to_string(&ErrorClass::InvalidSpec).unwrap();
        assert_eq!(json, "\"invalid_spec\"");
    }
}
