//! Process-wide configuration loaded from `~/.config/reelcast/config.toml`.
//!
//! Loaded once before a batch starts and shared read-only as `Arc<Config>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::captions::AnimationMode;
use crate::error::ConfigError;
use crate::job::Platform;
use crate::timeline::OverlayPosition;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub assets: AssetsConfig,
    pub avatar: AvatarConfig,
    pub screenshot: ScreenshotConfig,
    pub captions: CaptionConfig,
    pub transcription: TranscriptionConfig,
    pub render: RenderConfig,
    pub batch: BatchConfig,
    pub platforms: PlatformLimits,
    /// Per-style asset overrides, keyed by the job's style tag
    pub styles: BTreeMap<String, StyleAssets>,
}

/// Output encode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Video codec passed to `-c:v`
    pub codec: String,
    /// Encoder preset (e.g. "ultrafast", "medium", "slow")
    pub preset: String,
    /// Constant rate factor (lower is better quality)
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 60,
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

/// Asset and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory holding avatars (`<dir>/avatars/<style>.png`) by convention
    pub dir: PathBuf,
    /// Default background loop, used unless a style overrides it
    pub background: PathBuf,
    pub output_dir: PathBuf,
    /// Scratch space for caption files and transcription output
    pub temp_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("video_assets"),
            background: PathBuf::from("video_assets/background_gameplay.mp4"),
            output_dir: PathBuf::from("final_videos"),
            temp_dir: std::env::temp_dir().join("reelcast"),
        }
    }
}

/// Avatar overlay geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Scaled width in pixels (height keeps aspect)
    pub width: u32,
    pub position: OverlayPosition,
    pub margin_x: u32,
    pub margin_y: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            width: 500,
            position: OverlayPosition::BottomRight,
            margin_x: 30,
            margin_y: 30,
        }
    }
}

/// Hook screenshot timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// How long the hook stays on screen (seconds)
    pub duration: f64,
    /// Fade-in and fade-out length (seconds)
    pub fade: f64,
    /// Scaled width as a fraction of the frame width
    pub width_ratio: f64,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            duration: 5.0,
            fade: 0.3,
            width_ratio: 0.9,
        }
    }
}

/// Caption look and grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub font: String,
    pub font_size: u32,
    /// Text color (hex: RRGGBB)
    pub color: String,
    /// Karaoke highlight color (hex: RRGGBB)
    pub highlight_color: String,
    /// Outline color (hex: RRGGBB)
    pub outline_color: String,
    pub outline_width: f32,
    pub bold: bool,
    pub max_words_per_line: usize,
    pub max_gap_seconds: f64,
    /// Word-wrap limit for one on-screen line
    pub max_chars_per_line: usize,
    /// Position once the hook screenshot is gone
    pub position: OverlayPosition,
    /// Position while the hook screenshot is on screen
    pub hook_position: OverlayPosition,
    pub margin_v: u32,
    pub animation: AnimationMode,
    pub uppercase: bool,
    /// Dim words whose confidence fell below the threshold
    pub dim_low_confidence: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            font: "Impact".to_string(),
            font_size: 72,
            color: "FFFFFF".to_string(),
            highlight_color: "FFD400".to_string(),
            outline_color: "000000".to_string(),
            outline_width: 3.0,
            bold: true,
            max_words_per_line: 4,
            max_gap_seconds: 1.0,
            max_chars_per_line: 18,
            position: OverlayPosition::MiddleCenter,
            hook_position: OverlayPosition::TopCenter,
            margin_v: 120,
            animation: AnimationMode::Karaoke,
            uppercase: true,
            dim_low_confidence: false,
        }
    }
}

/// Speech model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Path to whisper executable (or "whisper" for PATH lookup)
    pub whisper_path: String,
    pub ffprobe_path: String,
    /// Whisper model size (tiny, base, small, medium, large)
    pub model: String,
    /// Language code, or "auto" for detection
    pub language: String,
    pub confidence_threshold: f32,
    /// Allowed relative difference between aligned and narration word counts
    pub word_count_tolerance: f64,
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            whisper_path: tool_path("whisper"),
            ffprobe_path: tool_path("ffprobe"),
            model: "base".to_string(),
            language: "en".to_string(),
            confidence_threshold: 0.5,
            word_count_tolerance: 0.25,
            timeout_secs: 600,
            extra_args: Vec::new(),
        }
    }
}

impl TranscriptionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Renderer invocation and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub ffmpeg_path: String,
    pub timeout_secs: u64,
    /// Total attempts, including the first
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Skip jobs whose output file already exists
    pub skip_existing: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: tool_path("ffmpeg"),
            timeout_secs: 900,
            retry_attempts: 2,
            retry_delay_ms: 2000,
            skip_existing: true,
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Batch limits (overridable from the command line)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent in-flight renders
    pub concurrency: usize,
    /// Concurrent transcriptions
    pub align_concurrency: usize,
    /// Maximum number of jobs submitted
    pub limit: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            align_concurrency: 1,
            limit: None,
        }
    }
}

/// Maximum video duration per platform, in seconds. `None` means no ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformLimits {
    pub default_platform: Platform,
    pub tiktok: Option<f64>,
    pub youtube_shorts: Option<f64>,
    pub instagram_reels: Option<f64>,
    pub generic: Option<f64>,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            default_platform: Platform::Tiktok,
            tiktok: Some(60.0),
            youtube_shorts: Some(60.0),
            instagram_reels: Some(90.0),
            generic: None,
        }
    }
}

impl PlatformLimits {
    #[must_use]
    pub fn max_duration(&self, platform: Platform) -> Option<f64> {
        match platform {
            Platform::Tiktok => self.tiktok,
            Platform::YoutubeShorts => self.youtube_shorts,
            Platform::InstagramReels => self.instagram_reels,
            Platform::Generic => self.generic,
        }
    }
}

/// Asset overrides for one character/style tag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleAssets {
    pub avatar: Option<PathBuf>,
    pub background: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values no job could render with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let v = &self.video;
        if v.width == 0 || v.height == 0 || v.width % 2 != 0 || v.height % 2 != 0 {
            return invalid(format!(
                "video resolution must be positive and even, got {}x{}",
                v.width, v.height
            ));
        }
        if v.fps == 0 {
            return invalid("video.fps must be positive".to_string());
        }
        if v.codec.trim().is_empty() {
            return invalid("video.codec must not be empty".to_string());
        }
        if !PRESETS.contains(&v.preset.as_str()) {
            return invalid(format!(
                "video.preset {:?} is not one of {}",
                v.preset,
                PRESETS.join(", ")
            ));
        }
        if v.crf > 51 {
            return invalid(format!("video.crf must be 0-51, got {}", v.crf));
        }

        if self.avatar.width == 0 || self.avatar.width > v.width {
            return invalid(format!(
                "avatar.width must be within 1..={}, got {}",
                v.width, self.avatar.width
            ));
        }

        let s = &self.screenshot;
        if !(s.duration.is_finite() && s.duration >= 0.0) {
            return invalid(format!("screenshot.duration must be >= 0, got {}", s.duration));
        }
        if !(s.fade.is_finite() && s.fade >= 0.0) {
            return invalid(format!("screenshot.fade must be >= 0, got {}", s.fade));
        }
        if !(s.width_ratio > 0.0 && s.width_ratio <= 1.0) {
            return invalid(format!(
                "screenshot.width_ratio must be in (0, 1], got {}",
                s.width_ratio
            ));
        }

        let c = &self.captions;
        if c.max_words_per_line == 0 {
            return invalid("captions.max_words_per_line must be at least 1".to_string());
        }
        if !(c.max_gap_seconds.is_finite() && c.max_gap_seconds >= 0.0) {
            return invalid(format!(
                "captions.max_gap_seconds must be >= 0, got {}",
                c.max_gap_seconds
            ));
        }
        if c.max_chars_per_line == 0 || c.font_size == 0 {
            return invalid("captions.max_chars_per_line and font_size must be positive".to_string());
        }
        for (name, color) in [
            ("color", &c.color),
            ("highlight_color", &c.highlight_color),
            ("outline_color", &c.outline_color),
        ] {
            if !is_hex_color(color) {
                return invalid(format!("captions.{name} must be RRGGBB hex, got {color:?}"));
            }
        }

        let t = &self.transcription;
        if !(0.0..=1.0).contains(&t.confidence_threshold) {
            return invalid(format!(
                "transcription.confidence_threshold must be in [0, 1], got {}",
                t.confidence_threshold
            ));
        }
        if !(t.word_count_tolerance.is_finite() && t.word_count_tolerance >= 0.0) {
            return invalid("transcription.word_count_tolerance must be >= 0".to_string());
        }
        if t.timeout_secs == 0 || self.render.timeout_secs == 0 {
            return invalid("timeouts must be positive".to_string());
        }

        if self.render.retry_attempts == 0 {
            return invalid("render.retry_attempts must be at least 1".to_string());
        }
        if self.batch.concurrency == 0 || self.batch.align_concurrency == 0 {
            return invalid("batch concurrency bounds must be at least 1".to_string());
        }

        for platform in Platform::ALL {
            if let Some(max) = self.platforms.max_duration(platform) {
                if !(max.is_finite() && max > 0.0) {
                    return invalid(format!(
                        "platforms.{platform} max duration must be positive, got {max}"
                    ));
                }
            }
        }

        Ok(())
    }

    /// Avatar for a style: explicit override, else `<assets.dir>/avatars/<style>.png`.
    #[must_use]
    pub fn avatar_for(&self, style: &str) -> PathBuf {
        self.styles
            .get(style)
            .and_then(|s| s.avatar.clone())
            .unwrap_or_else(|| self.assets.dir.join("avatars").join(format!("{style}.png")))
    }

    /// Background loop for a style: explicit override, else the default loop.
    #[must_use]
    pub fn background_for(&self, style: &str) -> PathBuf {
        self.styles
            .get(style)
            .and_then(|s| s.background.clone())
            .unwrap_or_else(|| self.assets.background.clone())
    }
}

const PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

fn is_hex_color(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolve a tool through PATH, falling back to the bare name.
fn tool_path(name: &str) -> String {
    which::which(name).map_or_else(|_| name.to_string(), |p| p.to_string_lossy().to_string())
}

/// Return the path to the default config file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelcast")
        .join("config.toml")
}
