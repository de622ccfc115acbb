use std::path::Path;

use anyhow::Result;
use serde_json::json;

use reelcast::Orchestrator;

use super::load_inputs;

pub async fn cmd_plan(jobs_path: &Path, config_path: Option<&Path>, limit: Option<usize>) -> Result<u8> {
    let (config, jobs) = load_inputs(jobs_path, config_path)?;
    let limit = limit.or(config.batch.limit).unwrap_or(usize::MAX);
    let orchestrator = Orchestrator::from_config(config);

    let mut plans = Vec::new();
    let mut failed = false;

    for job in jobs.iter().take(limit) {
        match orchestrator.plan(job).await {
            Ok(timeline) => plans.push(json!({
                "job_id": job.id,
                "timeline": timeline,
            })),
            Err(e) => {
                failed = true;
                plans.push(json!({
                    "job_id": job.id,
                    "error": {
                        "class": e.class(),
                        "message": e.to_string(),
                    },
                }));
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(u8::from(failed))
}
