use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;

use reelcast::Config;

pub async fn cmd_check(config_path: Option<&Path>) -> Result<u8> {
    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("🔧 reelcast {} tool check\n", reelcast::VERSION);

    let tools = [
        ("ffmpeg", config.render.ffmpeg_path.as_str(), "-version"),
        ("ffprobe", config.transcription.ffprobe_path.as_str(), "-version"),
        ("whisper", config.transcription.whisper_path.as_str(), "--help"),
    ];

    let mut missing = 0;
    for (name, path, probe_arg) in tools {
        if tool_available(path, probe_arg).await {
            println!("   ✅ {name}: {path}");
        } else {
            println!("   ❌ {name}: not found ({path})");
            missing += 1;
        }
    }

    if missing > 0 {
        println!("\n⚠️  {missing} tool(s) missing; rendering will fail");
    }
    Ok(u8::from(missing > 0))
}

async fn tool_available(path: &str, probe_arg: &str) -> bool {
    Command::new(path)
        .arg(probe_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
