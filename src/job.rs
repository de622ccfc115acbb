//! Narration jobs as handed over by the script-cleaning stage.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Target platform, which decides the duration ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Tiktok,
    #[serde(alias = "shorts")]
    YoutubeShorts,
    #[serde(alias = "reels")]
    InstagramReels,
    Generic,
}

impl Platform {
    pub const ALL: [Self; 4] = [
        Self::Tiktok,
        Self::YoutubeShorts,
        Self::InstagramReels,
        Self::Generic,
    ];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tiktok => "tiktok",
            Self::YoutubeShorts => "youtube_shorts",
            Self::InstagramReels => "instagram_reels",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// One narration to turn into one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationJob {
    pub id: String,
    pub narration_text: String,
    pub audio_path: PathBuf,
    /// Character/style tag, selects the avatar
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Hook screenshot of the source post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl NarrationJob {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        narration_text: impl Into<String>,
        audio_path: impl Into<PathBuf>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            narration_text: narration_text.into(),
            audio_path: audio_path.into(),
            style: style.into(),
            author: None,
            screenshot_path: None,
            platform: None,
        }
    }

    #[must_use]
    pub fn with_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// File name for this job's output, unique per job id.
    #[must_use]
    pub fn output_file_name(&self) -> String {
        let stem: String = self
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{stem}.mp4")
    }
}

/// Load the jobs array from a JSON file.
///
/// Duplicate ids are rejected since they would share an output file.
pub fn load_jobs(path: &Path) -> Result<Vec<NarrationJob>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_jobs(&content).map_err(|reason| ConfigError::Jobs {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_jobs(content: &str) -> Result<Vec<NarrationJob>, String> {
    let jobs: Vec<NarrationJob> = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let mut seen = std::collections::HashSet::new();
    for job in &jobs {
        if job.id.trim().is_empty() {
            return Err("job with empty id".to_string());
        }
        if !seen.insert(job.output_file_name()) {
            return Err(format!("duplicate job id {:?}", job.id));
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jobs() {
        let json = r#"[
            {"id": "1801", "narration_text": "hello there", "audio_path": "a.mp3", "style": "peter"},
            {"id": "1802", "narration_text": "x", "audio_path": "b.mp3", "style": "peter",
             "author": "@someone", "screenshot_path": "s.png", "platform": "shorts"}
        ]"#;
        let jobs = parse_jobs(json).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].platform, None);
        assert_eq!(jobs[1].platform, Some(Platform::YoutubeShorts));
        assert_eq!(jobs[1].screenshot_path, Some(PathBuf::from("s.png")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"[
            {"id": "a/b", "narration_text": "", "audio_path": "a.mp3", "style": "p"},
            {"id": "a_b", "narration_text": "", "audio_path": "b.mp3", "style": "p"}
        ]"#;
        let err = parse_jobs(json).unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_output_file_name_is_sanitized() {
        let job = NarrationJob::new("tweet 42/../x", "", "a.mp3", "peter");
        assert_eq!(job.output_file_name(), "tweet_42____x.mp4");
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let json = r#"[{"id": "1", "narration_text": "", "audio_path": "a", "style": "p", "platform": "myspace"}]"#;
        assert!(parse_jobs(json).is_err());
    }
}
