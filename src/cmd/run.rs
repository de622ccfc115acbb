use std::path::Path;

use anyhow::{bail, Result};
use tracing::warn;

use reelcast::{JobStatus, Orchestrator};

use super::load_inputs;

pub async fn cmd_run(
    jobs_path: &Path,
    config_path: Option<&Path>,
    limit: Option<usize>,
    concurrency: Option<usize>,
    summary_path: Option<&Path>,
) -> Result<u8> {
    let (config, jobs) = load_inputs(jobs_path, config_path)?;

    let concurrency = concurrency.unwrap_or(config.batch.concurrency);
    if concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }
    let limit = limit.or(config.batch.limit);

    eprintln!(
        "🎬 Rendering {} jobs from {}",
        limit.map_or(jobs.len(), |l| l.min(jobs.len())),
        jobs_path.display()
    );
    eprintln!("   Output: {}", config.assets.output_dir.display());

    let orchestrator = Orchestrator::from_config(config.clone());
    let summary = orchestrator.run(jobs, concurrency, limit).await;

    for result in &summary.results {
        match (result.status, &result.failure) {
            (JobStatus::Succeeded, _) => eprintln!(
                "   ✅ {} ({:.1}s, {} attempt(s))",
                result.job_id, result.metrics.elapsed_secs, result.metrics.attempts
            ),
            (JobStatus::Skipped, _) => eprintln!("   ⏭️  {} (output exists)", result.job_id),
            (JobStatus::Failed, Some(failure)) => {
                eprintln!("   ❌ {} [{}] {}", result.job_id, failure.class, failure.message);
            }
            (JobStatus::Failed, None) => eprintln!("   ❌ {}", result.job_id),
        }
    }

    eprintln!(
        "\n📊 {} succeeded, {} skipped, {} failed ({:.1}s)",
        summary.succeeded, summary.skipped, summary.failed, summary.elapsed_secs
    );

    let summary_file = summary_path.map_or_else(
        || config.assets.output_dir.join("batch_summary.json"),
        Path::to_path_buf,
    );
    if let Err(e) = summary.write_json(&summary_file).await {
        warn!("Failed to write summary {}: {e}", summary_file.display());
    } else {
        eprintln!("💾 Summary: {}", summary_file.display());
    }

    Ok(summary.exit_code())
}
