//! `reelcast` CLI - render narration jobs into vertical short videos

mod cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code for configuration and jobs-file errors
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "reelcast")]
#[command(about = "Narration-to-short-video engine: word-synced captions over gameplay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every job in a jobs file
    Run {
        /// JSON array of narration jobs
        #[arg(short, long)]
        jobs: PathBuf,

        /// Config file (default: ~/.config/reelcast/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only process the first N jobs
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum renders in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Where to write the batch summary JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Align, lay out and plan jobs without rendering; prints timelines as JSON
    Plan {
        /// JSON array of narration jobs
        #[arg(short, long)]
        jobs: PathBuf,

        /// Config file (default: ~/.config/reelcast/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only plan the first N jobs
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check that ffmpeg, ffprobe and whisper are available
    Check {
        /// Config file (default: ~/.config/reelcast/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `plan` output stays pipeable
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run {
            jobs,
            config,
            limit,
            concurrency,
            summary,
        } => {
            cmd::run::cmd_run(
                &jobs,
                config.as_deref(),
                limit,
                concurrency,
                summary.as_deref(),
            )
            .await
        }
        Commands::Plan { jobs, config, limit } => {
            cmd::plan::cmd_plan(&jobs, config.as_deref(), limit).await
        }
        Commands::Check { config } => cmd::check::cmd_check(config.as_deref()).await,
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
