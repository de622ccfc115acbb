//! Render execution with asset checks and transient-fault retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tracing::{debug, info, warn};

use super::compositor::build_instruction;
use super::{JobMetrics, JobResult, RenderBackend, RenderInstruction, RenderSpec};
use crate::captions::AssGenerator;
use crate::config::Config;
use crate::error::{JobError, RenderError};

/// Turns a [`RenderSpec`] into a [`JobResult`]
pub struct RenderExecutor {
    config: Arc<Config>,
    backend: Arc<dyn RenderBackend>,
    captions: AssGenerator,
}

impl RenderExecutor {
    pub fn new(config: Arc<Config>, backend: Arc<dyn RenderBackend>) -> Self {
        let captions = AssGenerator::from_config(&config);
        Self {
            config,
            backend,
            captions,
        }
    }

    /// Render a spec. Never panics or errors; failures are in the result.
    pub async fn render(&self, spec: RenderSpec) -> JobResult {
        let started = Instant::now();
        let mut metrics = JobMetrics::default();

        let outcome = self.try_render(&spec, &mut metrics).await;
        metrics.elapsed_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                info!(
                    job = %spec.job_id,
                    attempts = metrics.attempts,
                    bytes = metrics.output_bytes,
                    "Rendered {} in {:.1}s",
                    spec.output_path.display(),
                    metrics.render_secs
                );
                JobResult::succeeded(spec.job_id, spec.output_path, metrics)
            }
            Err(e) => {
                warn!(job = %spec.job_id, class = %e.class(), "Render failed: {e}");
                JobResult::failed(spec.job_id, &e, metrics)
            }
        }
    }

    async fn try_render(&self, spec: &RenderSpec, metrics: &mut JobMetrics) -> Result<(), JobError> {
        spec.check_assets()?;
        spec.timeline.validate().map_err(JobError::InvalidSpec)?;

        let temp_dir = &self.config.assets.temp_dir;
        fs::create_dir_all(temp_dir)
            .await
            .map_err(RenderError::Prepare)?;
        if let Some(parent) = spec.output_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(RenderError::Prepare)?;
        }

        let caption_file = temp_dir.join(format!("captions-{}.ass", uuid::Uuid::new_v4()));
        let partial = partial_path(&spec.output_path);

        let result: Result<(), RenderError> = async {
            self.captions
                .write_to_file(&spec.timeline, &caption_file)
                .await?;
            let instruction = build_instruction(
                spec,
                &caption_file,
                &self.config.render.ffmpeg_path,
                &partial,
            );
            self.execute_with_retry(&spec.job_id, &instruction, metrics)
                .await?;
            fs::rename(&partial, &spec.output_path)
                .await
                .map_err(RenderError::Finalize)
        }
        .await;

        // Cleanup
        let _ = fs::remove_file(&caption_file).await;
        if result.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        result?;

        metrics.output_bytes = fs::metadata(&spec.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(())
    }

    /// Run the instruction, retrying transient faults after a fixed delay.
    async fn execute_with_retry(
        &self,
        job_id: &str,
        instruction: &RenderInstruction,
        metrics: &mut JobMetrics,
    ) -> Result<(), RenderError> {
        let max_attempts = self.config.render.retry_attempts.max(1);

        loop {
            metrics.attempts += 1;
            debug!(job = %job_id, attempt = metrics.attempts, "Starting render");

            let started = Instant::now();
            let outcome = self.backend.execute(instruction).await;
            metrics.render_secs += started.elapsed().as_secs_f64();

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && metrics.attempts < max_attempts => {
                    warn!(
                        job = %job_id,
                        attempt = metrics.attempts,
                        max_attempts,
                        "Transient render fault, retrying: {e}"
                    );
                    tokio::time::sleep(self.config.render.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Sibling path the renderer writes before the final rename
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().to_string());
    output.with_file_name(format!("{stem}.part.mp4"))
}
