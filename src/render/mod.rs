//! Rendering a planned timeline to a video file
//!
//! - [`RenderSpec`] - everything one render needs, resolved to absolute paths
//! - [`compositor`] - translates a [`RenderSpec`] into one ffmpeg invocation
//! - [`backend`] - runs the invocation ([`RenderBackend`] seam)
//! - [`executor`] - asset checks, retries and the final [`JobResult`]

pub mod backend;
pub mod compositor;
pub mod executor;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::VideoConfig;
use crate::error::{AssetKind, ErrorClass, JobError};
use crate::timeline::{Layer, Timeline};

pub use backend::{FfmpegBackend, RenderBackend};
pub use compositor::RenderInstruction;
pub use executor::RenderExecutor;

/// Encoder settings; resolution and fps come from the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl From<&VideoConfig> for EncodeSettings {
    fn from(video: &VideoConfig) -> Self {
        Self {
            codec: video.codec.clone(),
            preset: video.preset.clone(),
            crf: video.crf,
            audio_codec: video.audio_codec.clone(),
            audio_bitrate: video.audio_bitrate.clone(),
        }
    }
}

/// One job's render input, consumed by value by [`RenderExecutor::render`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSpec {
    pub job_id: String,
    pub output_path: PathBuf,
    pub audio: PathBuf,
    pub encode: EncodeSettings,
    /// Layer sources are absolute
    pub timeline: Timeline,
}

impl RenderSpec {
    /// Build a spec, resolving the audio and every layer source to an absolute path.
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
        audio: &Path,
        encode: EncodeSettings,
        mut timeline: Timeline,
    ) -> Self {
        for event in &mut timeline.events {
            match &mut event.layer {
                Layer::Background { source }
                | Layer::Screenshot { source, .. }
                | Layer::Avatar { source } => *source = absolute(source),
                Layer::Caption { .. } => {}
            }
        }

        Self {
            job_id: job_id.into(),
            output_path: absolute(&output_path.into()),
            audio: absolute(audio),
            encode,
            timeline,
        }
    }

    /// Every file the render reads, tagged by kind.
    #[must_use]
    pub fn assets(&self) -> Vec<(AssetKind, &Path)> {
        let mut assets: Vec<(AssetKind, &Path)> = self
            .timeline
            .events
            .iter()
            .filter_map(|event| match &event.layer {
                Layer::Background { source } => Some((AssetKind::Background, source.as_path())),
                Layer::Screenshot { source, .. } => Some((AssetKind::Screenshot, source.as_path())),
                Layer::Avatar { source } => Some((AssetKind::Avatar, source.as_path())),
                Layer::Caption { .. } => None,
            })
            .collect();
        assets.push((AssetKind::Audio, self.audio.as_path()));
        assets
    }

    /// First referenced asset that is not a regular file.
    pub fn check_assets(&self) -> Result<(), JobError> {
        check_assets(self.assets())
    }
}

/// Fail with [`JobError::MissingAsset`] on the first path that is not a file.
pub fn check_assets<'a>(assets: impl IntoIterator<Item = (AssetKind, &'a Path)>) -> Result<(), JobError> {
    for (kind, path) in assets {
        if !path.is_file() {
            return Err(JobError::MissingAsset {
                kind,
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Terminal job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub class: ErrorClass,
    pub message: String,
}

/// Timing and size figures for one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Renderer invocations made
    pub attempts: u32,
    /// Wall time for the whole job
    pub elapsed_secs: f64,
    /// Wall time spent inside the renderer, summed over attempts
    pub render_secs: f64,
    pub output_bytes: u64,
}

/// Terminal outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub metrics: JobMetrics,
}

impl JobResult {
    #[must_use]
    pub fn succeeded(job_id: impl Into<String>, output_path: PathBuf, metrics: JobMetrics) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Succeeded,
            output_path: Some(output_path),
            failure: None,
            metrics,
        }
    }

    #[must_use]
    pub fn skipped(job_id: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Skipped,
            output_path: Some(output_path),
            failure: None,
            metrics: JobMetrics::default(),
        }
    }

    #[must_use]
    pub fn failed(job_id: impl Into<String>, error: &JobError, metrics: JobMetrics) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            output_path: None,
            failure: Some(JobFailure {
                class: error.class(),
                message: error.to_string(),
            }),
            metrics,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}
