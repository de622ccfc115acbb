//! `reelcast` - Narration-to-short-video engine
//!
//! # Pipeline
//!
//! - **Align**: narration audio to word timestamps (Whisper, proportional fallback)
//! - **Captions**: greedy grouping of words into on-screen chunks, ASS output
//! - **Timeline**: background, hook screenshot, avatar and captions as
//!   time-windowed overlay events clipped to the platform ceiling
//! - **Render**: one ffmpeg invocation per job, with transient-fault retries
//! - **Batch**: bounded-concurrency orchestration with per-job failure isolation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reelcast::{load_jobs, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load(None)?);
//!     let jobs = load_jobs(std::path::Path::new("jobs.json"))?;
//!     let summary = Orchestrator::from_config(config).run(jobs, 2, None).await;
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```

pub mod align;
pub mod batch;
pub mod captions;
pub mod config;
pub mod error;
pub mod job;
pub mod render;
pub mod timeline;

pub use align::{Aligner, FfprobeProbe, MediaProbe, SpeechModel, TranscriptSegment, WhisperModel, WordTimestamp};
pub use batch::{BatchSummary, FailedJob, JobState, Orchestrator};
pub use captions::{layout, AnimationMode, AssGenerator, CaptionChunk, CaptionLayout};
pub use config::Config;
pub use error::{AssetKind, ConfigError, ErrorClass, JobError, RenderError, TranscriptionError};
pub use job::{load_jobs, NarrationJob, Platform};
pub use render::{
    FfmpegBackend, JobFailure, JobMetrics, JobResult, JobStatus, RenderBackend, RenderExecutor,
    RenderInstruction, RenderSpec,
};
pub use timeline::{Layer, OverlayEvent, OverlayKind, OverlayPosition, Placement, Planner, Timeline};

/// Version of reelcast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
