//! ASS subtitle generation for burned-in captions
//!
//! Two styles are emitted: `Default` at the configured caption position and
//! `Hook` at the hook position, used while the screenshot is on screen.

use std::fmt::{self, Write as FmtWrite};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::AnimationMode;
use crate::align::WordTimestamp;
use crate::config::{CaptionConfig, Config};
use crate::error::RenderError;
use crate::timeline::{Layer, OverlayEvent, OverlayKind, OverlayPosition, Placement, Timeline};

const DEFAULT_STYLE: &str = "Default";
const HOOK_STYLE: &str = "Hook";

/// Fade length for `AnimationMode::Fade`, in milliseconds
const CAPTION_FADE_MS: u64 = 150;

/// Alpha applied to low-confidence words when dimming is on
const DIM_ALPHA: &str = "&H80&";

/// Style configuration for ASS captions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionStyle {
    pub name: String,
    pub font_name: String,
    pub font_size: u32,
    /// Primary color (`&HAABBGGRR`); the highlight color in karaoke mode
    pub primary_color: String,
    /// Secondary color, shown before a karaoke word is reached
    pub secondary_color: String,
    pub outline_color: String,
    pub back_color: String,
    pub bold: bool,
    pub outline: f32,
    pub shadow: f32,
    /// Alignment (numpad style: 1-9)
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
}

impl CaptionStyle {
    /// Build a named style from caption settings at `position`.
    #[must_use]
    pub fn from_config(name: &str, config: &CaptionConfig, position: OverlayPosition) -> Self {
        let (primary, secondary) = match config.animation {
            AnimationMode::Karaoke => (&config.highlight_color, &config.color),
            AnimationMode::Fade | AnimationMode::Static => (&config.color, &config.color),
        };

        Self {
            name: name.to_string(),
            font_name: config.font.clone(),
            font_size: config.font_size,
            primary_color: ass_color(primary),
            secondary_color: ass_color(secondary),
            outline_color: ass_color(&config.outline_color),
            back_color: "&H80000000".to_string(),
            bold: config.bold,
            outline: config.outline_width,
            shadow: 0.0,
            alignment: position.to_ass_alignment(),
            margin_l: 40,
            margin_r: 40,
            margin_v: config.margin_v,
        }
    }

    fn to_ass_line(&self) -> String {
        format!(
            "Style: {},{},{},{},{},{},{},{},0,0,0,100,100,0,0,1,{},{},{},{},{},{},1",
            self.name,
            self.font_name,
            self.font_size,
            self.primary_color,
            self.secondary_color,
            self.outline_color,
            self.back_color,
            if self.bold { -1 } else { 0 },
            self.outline,
            self.shadow,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v
        )
    }
}

/// Convert `RRGGBB` hex to ASS `&H00BBGGRR`. Invalid input maps to white.
#[must_use]
pub fn ass_color(hex: &str) -> String {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return "&H00FFFFFF".to_string();
    }
    let (r, g, b) = (&hex[0..2], &hex[2..4], &hex[4..6]);
    format!("&H00{b}{g}{r}").to_uppercase()
}

/// Generates the caption ASS document for a timeline
#[derive(Debug, Clone)]
pub struct AssGenerator {
    pub play_res_x: u32,
    pub play_res_y: u32,
    pub styles: Vec<CaptionStyle>,
    pub title: String,
    pub dim_low_confidence: bool,
}

impl AssGenerator {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let captions = &config.captions;
        Self {
            play_res_x: config.video.width,
            play_res_y: config.video.height,
            styles: vec![
                CaptionStyle::from_config(DEFAULT_STYLE, captions, captions.position),
                CaptionStyle::from_config(HOOK_STYLE, captions, captions.hook_position),
            ],
            title: "reelcast captions".to_string(),
            dim_low_confidence: captions.dim_low_confidence,
        }
    }

    fn generate_header(&self) -> Result<String, fmt::Error> {
        let mut header = String::new();

        writeln!(header, "[Script Info]")?;
        writeln!(header, "Title: {}", self.title)?;
        writeln!(header, "ScriptType: v4.00+")?;
        writeln!(header, "PlayResX: {}", self.play_res_x)?;
        writeln!(header, "PlayResY: {}", self.play_res_y)?;
        writeln!(header, "WrapStyle: 2")?;
        writeln!(header, "ScaledBorderAndShadow: yes")?;
        writeln!(header, "YCbCr Matrix: TV.709")?;
        writeln!(header)?;

        writeln!(header, "[V4+ Styles]")?;
        writeln!(
            header,
            "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
             OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, \
             ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, \
             MarginL, MarginR, MarginV, Encoding"
        )?;
        for style in &self.styles {
            writeln!(header, "{}", style.to_ass_line())?;
        }
        writeln!(header)?;

        writeln!(header, "[Events]")?;
        writeln!(
            header,
            "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
        )?;

        Ok(header)
    }

    /// Render the full ASS document for the caption events of `timeline`.
    pub fn generate(&self, timeline: &Timeline) -> Result<String, fmt::Error> {
        let mut output = self.generate_header()?;
        let hook_end = timeline.hook_window().map_or(0.0, |(_, end)| end);

        for event in timeline.events_of(OverlayKind::Caption) {
            for (start, end, style) in split_at_hook(event, hook_end) {
                if end <= start {
                    continue;
                }
                let text = self.event_text(event, start, end);
                writeln!(
                    output,
                    "Dialogue: 0,{},{},{style},,0,0,0,,{text}",
                    format_ass_time(start),
                    format_ass_time(end),
                )?;
            }
        }

        Ok(output)
    }

    /// Write the caption document next to the render inputs.
    pub async fn write_to_file(&self, timeline: &Timeline, path: &Path) -> Result<(), RenderError> {
        let content = self
            .generate(timeline)
            .map_err(|e| RenderError::Prepare(std::io::Error::other(e)))?;
        fs::write(path, content).await.map_err(RenderError::Prepare)
    }

    fn event_text(&self, event: &OverlayEvent, start: f64, end: f64) -> String {
        let Layer::Caption {
            text,
            words,
            line_breaks,
            animation,
        } = &event.layer
        else {
            return String::new();
        };

        let mut out = position_tag(event, self.play_res_x, self.play_res_y);

        match animation {
            AnimationMode::Karaoke if !words.is_empty() => {
                out.push_str(&self.karaoke_text(words, line_breaks, start, end));
            }
            AnimationMode::Fade => {
                let window_ms = ((end - start) * 1000.0).max(0.0) as u64;
                let fade = CAPTION_FADE_MS.min(window_ms / 2);
                let _ = write!(out, "{{\\fad({fade},{fade})}}");
                out.push_str(&self.plain_text(text, words, line_breaks));
            }
            _ => out.push_str(&self.plain_text(text, words, line_breaks)),
        }

        out
    }

    /// Words with `\k` durations measured from the part's start, so a split
    /// caption's second part begins with already-spoken words highlighted.
    fn karaoke_text(&self, words: &[WordTimestamp], breaks: &[usize], start: f64, end: f64) -> String {
        let mut out = String::new();
        let mut cursor = start;

        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                out.push_str(if breaks.contains(&i) { "\\N" } else { " " });
            }

            let boundary = words
                .get(i + 1)
                .map_or(end, |next| next.start)
                .clamp(start, end);
            let centis = ((boundary - cursor) * 100.0).round().max(0.0) as u64;
            cursor = cursor.max(boundary);

            let dim = self.dim_low_confidence && word.low_confidence;
            if dim {
                let _ = write!(out, "{{\\k{centis}\\alpha{DIM_ALPHA}}}");
            } else {
                let _ = write!(out, "{{\\k{centis}}}");
            }
            out.push_str(&escape_text(&word.word));
            if dim {
                out.push_str("{\\alpha&H00&}");
            }
        }

        out
    }

    fn plain_text(&self, text: &str, words: &[WordTimestamp], breaks: &[usize]) -> String {
        if !self.dim_low_confidence || !words.iter().any(|w| w.low_confidence) {
            return escape_text(text).replace('\n', "\\N");
        }

        let mut out = String::new();
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                out.push_str(if breaks.contains(&i) { "\\N" } else { " " });
            }
            if word.low_confidence {
                let _ = write!(out, "{{\\alpha{DIM_ALPHA}}}{}{{\\alpha&H00&}}", escape_text(&word.word));
            } else {
                out.push_str(&escape_text(&word.word));
            }
        }
        out
    }
}

/// Split a caption window at the end of the hook: the part on screen with
/// the screenshot uses the hook style, the rest the default style.
fn split_at_hook(event: &OverlayEvent, hook_end: f64) -> Vec<(f64, f64, &'static str)> {
    if event.end <= hook_end {
        vec![(event.start, event.end, HOOK_STYLE)]
    } else if event.start >= hook_end {
        vec![(event.start, event.end, DEFAULT_STYLE)]
    } else {
        vec![
            (event.start, hook_end, HOOK_STYLE),
            (hook_end, event.end, DEFAULT_STYLE),
        ]
    }
}

/// `\pos` override for custom-positioned captions
fn position_tag(event: &OverlayEvent, width: u32, height: u32) -> String {
    match event.placement {
        Placement::Text {
            position: OverlayPosition::Custom(x, y),
            ..
        } => {
            let (x, y) = (f64::from(x), f64::from(y));
            let (px, py) = if x < 1.0 && y < 1.0 {
                (x * f64::from(width), y * f64::from(height))
            } else {
                (x, y)
            };
            format!("{{\\pos({},{})}}", px.round() as i64, py.round() as i64)
        }
        _ => String::new(),
    }
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

/// Format seconds as an ASS timestamp (H:MM:SS.cc)
fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6000;
    let secs = (total_cs % 6000) / 100;
    let centis = total_cs % 100;
    format!("{hours}:{minutes:02}:{secs:02}.{centis:02}")
}
