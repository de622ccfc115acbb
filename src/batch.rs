//! Batch orchestration: many narration jobs, one summary
//!
//! Each job runs as its own task through an explicit [`JobState`] machine.
//! Alignment and rendering are bounded by separate semaphores, so later jobs
//! transcribe while earlier ones render. A failing or panicking job only ever
//! produces a failed [`JobResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::align::{Aligner, FfprobeProbe, MediaProbe, WhisperModel, WordTimestamp};
use crate::captions::CaptionLayout;
use crate::config::Config;
use crate::error::{AssetKind, ErrorClass, JobError};
use crate::job::NarrationJob;
use crate::render::{
    check_assets, EncodeSettings, FfmpegBackend, JobMetrics, JobResult, JobStatus, RenderExecutor,
    RenderSpec,
};
use crate::timeline::{Planner, Timeline};

/// Per-job pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Validating,
    Aligning,
    LayingOut,
    Planning,
    Rendering,
    Succeeded,
    Skipped,
    Failed,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped | Self::Failed)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use JobState::{
            Aligning, Failed, LayingOut, Pending, Planning, Rendering, Skipped, Succeeded,
            Validating,
        };
        matches!(
            (self, next),
            (Pending, Validating)
                | (Validating, Aligning | Skipped | Failed)
                | (Aligning, LayingOut | Failed)
                | (LayingOut, Planning | Failed)
                | (Planning, Rendering | Failed)
                | (Rendering, Succeeded | Failed)
        )
    }

    /// Move to `next`, rejecting transitions the pipeline never makes.
    pub fn transition(&mut self, next: Self) -> Result<(), JobError> {
        if !self.can_transition_to(next) {
            return Err(JobError::Internal(format!(
                "illegal job state transition {self:?} -> {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }
}

/// One failed job as listed in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    pub job_id: String,
    pub class: ErrorClass,
    pub message: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub submitted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Per-job results, in input order
    pub results: Vec<JobResult>,
    pub failures: Vec<FailedJob>,
}

impl BatchSummary {
    #[must_use]
    pub fn from_results(started_at: DateTime<Utc>, elapsed_secs: f64, results: Vec<JobResult>) -> Self {
        let count = |status: JobStatus| results.iter().filter(|r| r.status == status).count();
        let failures = results
            .iter()
            .filter_map(|r| {
                r.failure.as_ref().map(|f| FailedJob {
                    job_id: r.job_id.clone(),
                    class: f.class,
                    message: f.message.clone(),
                })
            })
            .collect();

        Self {
            started_at,
            elapsed_secs,
            submitted: results.len(),
            succeeded: count(JobStatus::Succeeded),
            skipped: count(JobStatus::Skipped),
            failed: count(JobStatus::Failed),
            results,
            failures,
        }
    }

    /// Process exit code: 0 when no job failed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.failed > 0)
    }

    pub async fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await
    }
}

struct Pipeline {
    config: Arc<Config>,
    aligner: Aligner,
    probe: Arc<dyn MediaProbe>,
    executor: RenderExecutor,
    layout: CaptionLayout,
    planner: Planner,
}

/// Runs narration jobs end to end
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        aligner: Aligner,
        probe: Arc<dyn MediaProbe>,
        executor: RenderExecutor,
    ) -> Self {
        let layout = CaptionLayout::from_config(&config.captions);
        let planner = Planner::new(config.clone());
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                aligner,
                probe,
                executor,
                layout,
                planner,
            }),
        }
    }

    /// Production wiring: whisper, ffprobe and ffmpeg from the configured paths.
    #[must_use]
    pub fn from_config(config: Arc<Config>) -> Self {
        let transcription = &config.transcription;
        let model = Arc::new(WhisperModel::new(
            transcription.clone(),
            config.assets.temp_dir.clone(),
        ));
        let aligner = Aligner::new(model, transcription);
        let probe = Arc::new(FfprobeProbe::new(
            transcription.ffprobe_path.clone(),
            transcription.timeout(),
        ));
        let executor = RenderExecutor::new(
            config.clone(),
            Arc::new(FfmpegBackend::new(config.render.timeout())),
        );
        Self::new(config, aligner, probe, executor)
    }

    /// Run jobs with at most `concurrency_limit` renders in flight.
    ///
    /// Only the first `job_count_limit` jobs (input order) are submitted.
    pub async fn run(
        &self,
        jobs: Vec<NarrationJob>,
        concurrency_limit: usize,
        job_count_limit: Option<usize>,
    ) -> BatchSummary {
        let started_at = Utc::now();
        let started = Instant::now();

        let total = jobs.len();
        let submitted: Vec<NarrationJob> = jobs
            .into_iter()
            .take(job_count_limit.unwrap_or(usize::MAX))
            .collect();

        info!(
            "Submitting {} of {} jobs (render concurrency: {})",
            submitted.len(),
            total,
            concurrency_limit.max(1)
        );

        let render_slots = Arc::new(Semaphore::new(concurrency_limit.max(1)));
        let align_slots = Arc::new(Semaphore::new(
            self.pipeline.config.batch.align_concurrency.max(1),
        ));

        let mut ids = Vec::with_capacity(submitted.len());
        let mut handles = Vec::with_capacity(submitted.len());
        for job in submitted {
            ids.push(job.id.clone());
            let pipeline = self.pipeline.clone();
            let render_slots = render_slots.clone();
            let align_slots = align_slots.clone();
            handles.push(tokio::spawn(async move {
                pipeline.process(job, &align_slots, &render_slots).await
            }));
        }

        let joined = futures::future::join_all(handles).await;
        let results: Vec<JobResult> = ids
            .into_iter()
            .zip(joined)
            .map(|(id, joined)| {
                joined.unwrap_or_else(|e| {
                    warn!(job = %id, "Job task aborted: {e}");
                    JobResult::failed(id, &JobError::Internal(e.to_string()), JobMetrics::default())
                })
            })
            .collect();

        let summary =
            BatchSummary::from_results(started_at, started.elapsed().as_secs_f64(), results);
        info!(
            "Batch complete: {} succeeded, {} skipped, {} failed in {:.1}s",
            summary.succeeded, summary.skipped, summary.failed, summary.elapsed_secs
        );
        summary
    }

    /// Validate, align, lay out and plan one job without rendering it.
    pub async fn plan(&self, job: &NarrationJob) -> Result<Timeline, JobError> {
        let pipeline = &self.pipeline;
        pipeline.validate_assets(job)?;
        let (words, duration) = pipeline.align(job).await?;
        let chunks = pipeline.layout.layout(&words);
        pipeline.planner.plan(job, duration, &chunks)
    }
}

impl Pipeline {
    async fn process(&self, job: NarrationJob, align_slots: &Semaphore, render_slots: &Semaphore) -> JobResult {
        let started = Instant::now();
        let mut state = JobState::Pending;

        let mut result = match self.drive(&job, &mut state, align_slots, render_slots).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job = %job.id, class = %e.class(), ?state, "Job failed: {e}");
                if let Err(rejected) = state.transition(JobState::Failed) {
                    debug!(job = %job.id, "{rejected}");
                }
                JobResult::failed(&job.id, &e, JobMetrics::default())
            }
        };

        result.metrics.elapsed_secs = started.elapsed().as_secs_f64();
        result
    }

    async fn drive(
        &self,
        job: &NarrationJob,
        state: &mut JobState,
        align_slots: &Semaphore,
        render_slots: &Semaphore,
    ) -> Result<JobResult, JobError> {
        state.transition(JobState::Validating)?;
        let output_path = self.output_path(job);
        if self.config.render.skip_existing && output_path.is_file() {
            info!(job = %job.id, "Output {} exists, skipping", output_path.display());
            state.transition(JobState::Skipped)?;
            return Ok(JobResult::skipped(&job.id, output_path));
        }
        self.validate_assets(job)?;

        state.transition(JobState::Aligning)?;
        let (words, duration) = {
            let _permit = align_slots
                .acquire()
                .await
                .map_err(|e| JobError::Internal(e.to_string()))?;
            self.align(job).await?
        };

        state.transition(JobState::LayingOut)?;
        let chunks = self.layout.layout(&words);
        debug!(job = %job.id, words = words.len(), chunks = chunks.len(), "Laid out captions");

        state.transition(JobState::Planning)?;
        let timeline = self.planner.plan(job, duration, &chunks)?;

        state.transition(JobState::Rendering)?;
        let _permit = render_slots
            .acquire()
            .await
            .map_err(|e| JobError::Internal(e.to_string()))?;
        let spec = RenderSpec::new(
            &job.id,
            output_path,
            &job.audio_path,
            EncodeSettings::from(&self.config.video),
            timeline,
        );
        let result = self.executor.render(spec).await;

        state.transition(if result.is_failed() {
            JobState::Failed
        } else {
            JobState::Succeeded
        })?;
        Ok(result)
    }

    fn output_path(&self, job: &NarrationJob) -> PathBuf {
        self.config.assets.output_dir.join(job.output_file_name())
    }

    /// Background, avatar and (when referenced) screenshot must exist.
    fn validate_assets(&self, job: &NarrationJob) -> Result<(), JobError> {
        let background = self.config.background_for(&job.style);
        let avatar = self.config.avatar_for(&job.style);

        let mut assets = vec![
            (AssetKind::Background, background.as_path()),
            (AssetKind::Avatar, avatar.as_path()),
        ];
        if let Some(ref screenshot) = job.screenshot_path {
            assets.push((AssetKind::Screenshot, screenshot.as_path()));
        }
        check_assets(assets)
    }

    async fn align(&self, job: &NarrationJob) -> Result<(Vec<WordTimestamp>, f64), JobError> {
        info!(job = %job.id, "Aligning {}", job.audio_path.display());
        let words = self
            .aligner
            .align(&job.audio_path, &job.narration_text)
            .await?;
        let duration = self.probe.duration(&job.audio_path).await?;
        Ok((words, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = JobState::Pending;
        for next in [
            JobState::Validating,
            JobState::Aligning,
            JobState::LayingOut,
            JobState::Planning,
            JobState::Rendering,
            JobState::Succeeded,
        ] {
            state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_validating_can_skip_or_fail() {
        assert!(JobState::Validating.can_transition_to(JobState::Skipped));
        assert!(JobState::Validating.can_transition_to(JobState::Failed));
        assert!(!JobState::Aligning.can_transition_to(JobState::Skipped));
    }

    #[test]
    fn test_every_working_stage_can_fail() {
        for stage in [
            JobState::Validating,
            JobState::Aligning,
            JobState::LayingOut,
            JobState::Planning,
            JobState::Rendering,
        ] {
            let mut state = stage;
            state.transition(JobState::Failed).unwrap();
            assert_eq!(state, JobState::Failed);
        }
        assert!(!JobState::Pending.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut state = JobState::Pending;
        let err = state.transition(JobState::Rendering).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(state, JobState::Pending);

        let mut done = JobState::Succeeded;
        assert!(done.transition(JobState::Failed).is_err());
        assert!(!JobState::Failed.can_transition_to(JobState::Pending));
    }

    #[test]
    fn test_summary_counts_and_exit_code() {
        let ok = JobResult::succeeded("a", "a.mp4".into(), JobMetrics::default());
        let skipped = JobResult::skipped("b", "b.mp4".into());
        let summary = BatchSummary::from_results(Utc::now(), 1.0, vec![ok.clone(), skipped]);
        assert_eq!((summary.succeeded, summary.skipped, summary.failed), (1, 1, 0));
        assert_eq!(summary.exit_code(), 0);

        let failed = JobResult::failed(
            "c",
            &JobError::MissingAsset {
                kind: AssetKind::Avatar,
                path: "c.png".into(),
            },
            JobMetrics::default(),
        );
        let summary = BatchSummary::from_results(Utc::now(), 1.0, vec![ok, failed]);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].job_id, "c");
        assert_eq!(summary.failures[0].class, ErrorClass::MissingAsset);
    }

    #[test]
    fn test_summary_json_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("batch_summary.json");
        let summary = BatchSummary::from_results(Utc::now(), 0.5, vec![]);

        tokio_test::block_on(summary.write_json(&path)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["submitted"], 0);
        assert!(json["started_at"].is_string());
    }
}
