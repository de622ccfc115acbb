pub mod check;
pub mod plan;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use reelcast::{load_jobs, Config, NarrationJob};

/// Load configuration and jobs; any failure here is fatal to the run.
pub fn load_inputs(jobs_path: &Path, config_path: Option<&Path>) -> Result<(Arc<Config>, Vec<NarrationJob>)> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let jobs = load_jobs(jobs_path).context("Failed to load jobs")?;
    Ok((Arc::new(config), jobs))
}
