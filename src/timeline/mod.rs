//! Overlay timeline planning
//!
//! A [`Timeline`] is a flat list of time-windowed [`OverlayEvent`]s owned by
//! one job. Stacking order is a pure function of the layer kind, so the
//! rendered result never depends on the order events were built in.

pub mod placement;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::WordTimestamp;
use crate::captions::{AnimationMode, CaptionChunk};
use crate::config::Config;
use crate::error::JobError;
use crate::job::NarrationJob;

pub use placement::{OverlayPosition, Placement};

/// Overlay layer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Background,
    Screenshot,
    Avatar,
    Caption,
}

impl OverlayKind {
    /// Stacking order, lowest drawn first
    #[must_use]
    pub fn z_order(self) -> u8 {
        match self {
            Self::Background => 0,
            Self::Screenshot => 1,
            Self::Avatar => 2,
            Self::Caption => 3,
        }
    }
}

/// Layer content of an overlay event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    /// Looped when shorter than the timeline, trimmed when longer
    Background { source: PathBuf },
    Screenshot {
        source: PathBuf,
        fade_in: f64,
        fade_out: f64,
    },
    Avatar { source: PathBuf },
    Caption {
        text: String,
        words: Vec<WordTimestamp>,
        line_breaks: Vec<usize>,
        animation: AnimationMode,
    },
}

impl Layer {
    #[must_use]
    pub fn kind(&self) -> OverlayKind {
        match self {
            Self::Background { .. } => OverlayKind::Background,
            Self::Screenshot { .. } => OverlayKind::Screenshot,
            Self::Avatar { .. } => OverlayKind::Avatar,
            Self::Caption { .. } => OverlayKind::Caption,
        }
    }
}

/// A time-windowed visual layer, active on `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEvent {
    pub start: f64,
    pub end: f64,
    pub placement: Placement,
    pub layer: Layer,
}

impl OverlayEvent {
    #[must_use]
    pub fn kind(&self) -> OverlayKind {
        self.layer.kind()
    }

    #[must_use]
    pub fn z_order(&self) -> u8 {
        self.kind().z_order()
    }
}

/// Complete overlay plan for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Seconds; audio duration clipped to the platform ceiling
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Sorted by z-order, then start
    pub events: Vec<OverlayEvent>,
}

impl Timeline {
    #[must_use]
    pub fn new(duration: f64, width: u32, height: u32, fps: u32) -> Self {
        Self {
            duration,
            width,
            height,
            fps,
            events: Vec::new(),
        }
    }

    /// Insert an event, keeping z-order/start ordering.
    pub fn push(&mut self, event: OverlayEvent) {
        let key = (event.z_order(), event.start);
        let idx = self
            .events
            .partition_point(|e| (e.z_order(), e.start) <= key);
        self.events.insert(idx, event);
    }

    pub fn events_of(&self, kind: OverlayKind) -> impl Iterator<Item = &OverlayEvent> {
        self.events.iter().filter(move |e| e.kind() == kind)
    }

    /// Window of the hook screenshot, if the job has one
    #[must_use]
    pub fn hook_window(&self) -> Option<(f64, f64)> {
        self.events_of(OverlayKind::Screenshot)
            .next()
            .map(|e| (e.start, e.end))
    }

    /// Check the duration and that every window lies within `[0, duration]`.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(format!("timeline duration {} is not positive", self.duration));
        }
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err("timeline resolution and fps must be positive".to_string());
        }
        for event in &self.events {
            let inside = event.start.is_finite()
                && event.end.is_finite()
                && event.start >= 0.0
                && event.start <= event.end
                && event.end <= self.duration;
            if !inside {
                return Err(format!(
                    "{:?} event window [{}, {}) outside [0, {}]",
                    event.kind(),
                    event.start,
                    event.end,
                    self.duration
                ));
            }
        }
        Ok(())
    }
}

/// Builds timelines from jobs and caption chunks
pub struct Planner {
    config: Arc<Config>,
}

impl Planner {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Timeline duration: audio duration clipped to the platform ceiling.
    #[must_use]
    pub fn resolve_duration(&self, job: &NarrationJob, audio_duration: f64) -> f64 {
        let platform = job.platform.unwrap_or(self.config.platforms.default_platform);
        match self.config.platforms.max_duration(platform) {
            Some(max) => audio_duration.min(max),
            None => audio_duration,
        }
    }

    /// Plan the full overlay timeline for a job.
    pub fn plan(
        &self,
        job: &NarrationJob,
        audio_duration: f64,
        chunks: &[CaptionChunk],
    ) -> Result<Timeline, JobError> {
        if !(audio_duration.is_finite() && audio_duration > 0.0) {
            return Err(JobError::InvalidSpec(format!(
                "audio duration {audio_duration} is not positive"
            )));
        }

        let video = &self.config.video;
        let duration = self.resolve_duration(job, audio_duration);
        let mut timeline = Timeline::new(duration, video.width, video.height, video.fps);

        timeline.push(OverlayEvent {
            start: 0.0,
            end: duration,
            placement: Placement::Fill,
            layer: Layer::Background {
                source: self.config.background_for(&job.style),
            },
        });

        if let Some(ref screenshot) = job.screenshot_path {
            let window = self.config.screenshot.duration.min(duration);
            if window > 0.0 {
                let fade = self.config.screenshot.fade.min(window / 2.0);
                timeline.push(OverlayEvent {
                    start: 0.0,
                    end: window,
                    placement: Placement::Anchored {
                        position: OverlayPosition::MiddleCenter,
                        width: (f64::from(video.width) * self.config.screenshot.width_ratio).round() as u32,
                        margin_x: 0,
                        margin_y: 0,
                    },
                    layer: Layer::Screenshot {
                        source: screenshot.clone(),
                        fade_in: fade,
                        fade_out: fade,
                    },
                });
            }
        }

        let avatar = &self.config.avatar;
        timeline.push(OverlayEvent {
            start: 0.0,
            end: duration,
            placement: Placement::Anchored {
                position: avatar.position,
                width: avatar.width,
                margin_x: avatar.margin_x,
                margin_y: avatar.margin_y,
            },
            layer: Layer::Avatar {
                source: self.config.avatar_for(&job.style),
            },
        });

        let mut dropped = 0usize;
        for chunk in chunks {
            match self.caption_event(chunk, duration) {
                Some(event) => timeline.push(event),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(
                job = %job.id,
                dropped,
                "Dropped caption chunks past the {duration:.1}s ceiling"
            );
        }

        Ok(timeline)
    }

    /// Caption event for a chunk, truncated at the ceiling or dropped past it.
    fn caption_event(&self, chunk: &CaptionChunk, duration: f64) -> Option<OverlayEvent> {
        if chunk.start >= duration {
            return None;
        }

        let words: Vec<WordTimestamp> = chunk
            .words
            .iter()
            .filter(|w| w.start < duration)
            .map(|w| {
                let mut w = w.clone();
                w.end = w.end.min(duration);
                w
            })
            .collect();

        let (text, line_breaks) = if words.len() == chunk.words.len() {
            (chunk.display_text.clone(), chunk.line_breaks.clone())
        } else {
            let breaks: Vec<usize> = chunk
                .line_breaks
                .iter()
                .copied()
                .filter(|&b| b < words.len())
                .collect();
            (join_lines(&words, &breaks), breaks)
        };

        Some(OverlayEvent {
            start: chunk.start,
            end: chunk.end.min(duration),
            placement: Placement::Text {
                position: self.config.captions.position,
                wrap_chars: self.config.captions.max_chars_per_line,
            },
            layer: Layer::Caption {
                text,
                words,
                line_breaks,
                animation: chunk.animation,
            },
        })
    }
}

fn join_lines(words: &[WordTimestamp], breaks: &[usize]) -> String {
    let mut text = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            text.push(if breaks.contains(&i) { '\n' } else { ' ' });
        }
        text.push_str(&word.word);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::layout;
    use crate::job::Platform;

    fn planner() -> Planner {
        Planner::new(Arc::new(Config::default()))
    }

    fn chunk(words: &[(&str, f64, f64)]) -> CaptionChunk {
        let words: Vec<_> = words
            .iter()
            .map(|(w, s, e)| WordTimestamp::new(*w, *s, *e))
            .collect();
        layout(&words, usize::MAX, f64::INFINITY).remove(0)
    }

    fn job() -> NarrationJob {
        NarrationJob::new("t1", "narration", "a.mp3", "peter")
            .with_screenshot("shot.png")
            .with_platform(Platform::Tiktok)
    }

    fn assert_bounded(timeline: &Timeline) {
        assert!(timeline.validate().is_ok(), "{:?}", timeline.validate());
    }

    #[test]
    fn test_short_audio_keeps_its_duration() {
        let timeline = planner().plan(&job(), 45.0, &[]).unwrap();

        assert_eq!(timeline.duration, 45.0);
        assert_eq!(timeline.hook_window(), Some((0.0, 5.0)));
        assert_bounded(&timeline);
    }

    #[test]
    fn test_screenshot_clamped_to_short_audio() {
        let timeline = planner().plan(&job(), 3.0, &[]).unwrap();
        assert_eq!(timeline.hook_window(), Some((0.0, 3.0)));

        let screenshot = timeline.events_of(OverlayKind::Screenshot).next().unwrap();
        match &screenshot.layer {
            Layer::Screenshot { fade_in, fade_out, .. } => {
                assert_eq!(*fade_in, 0.3);
                assert_eq!(*fade_out, 0.3);
            }
            other => panic!("unexpected layer {other:?}"),
        }
    }

    #[test]
    fn test_fade_clamped_to_half_window() {
        let mut config = Config::default();
        config.screenshot.duration = 1.0;
        config.screenshot.fade = 2.0;
        let planner = Planner::new(Arc::new(config));
        let timeline = planner.plan(&job(), 30.0, &[]).unwrap();

        let screenshot = timeline.events_of(OverlayKind::Screenshot).next().unwrap();
        assert!(matches!(
            screenshot.layer,
            Layer::Screenshot { fade_in, fade_out, .. } if fade_in == 0.5 && fade_out == 0.5
        ));
    }

    #[test]
    fn test_long_audio_clipped_to_platform_ceiling() {
        let chunks = vec![
            chunk(&[("early", 10.0, 11.0)]),
            chunk(&[("straddle", 58.0, 59.5), ("ing", 59.5, 62.0)]),
            chunk(&[("late", 61.0, 62.0)]),
        ];
        let timeline = planner().plan(&job(), 90.0, &chunks).unwrap();

        assert_eq!(timeline.duration, 60.0);
        let captions: Vec<_> = timeline.events_of(OverlayKind::Caption).collect();
        assert_eq!(captions.len(), 2);
        assert_eq!((captions[1].start, captions[1].end), (58.0, 60.0));
        for event in &timeline.events {
            assert!(event.end <= 60.0);
        }
        assert_bounded(&timeline);
    }

    #[test]
    fn test_chunk_starting_exactly_at_ceiling_is_dropped() {
        let chunks = vec![chunk(&[("edge", 60.0, 60.5)]), chunk(&[("fits", 59.0, 60.0)])];
        let timeline = planner().plan(&job(), 90.0, &chunks).unwrap();

        let captions: Vec<_> = timeline.events_of(OverlayKind::Caption).collect();
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].end, 60.0);
    }

    #[test]
    fn test_truncated_chunk_drops_words_past_ceiling() {
        let chunks = vec![chunk(&[("one", 59.0, 59.5), ("two", 59.5, 59.9), ("three", 60.1, 60.5)])];
        let timeline = planner().plan(&job(), 90.0, &chunks).unwrap();

        let caption = timeline.events_of(OverlayKind::Caption).next().unwrap();
        match &caption.layer {
            Layer::Caption { text, words, .. } => {
                assert_eq!(text, "one two");
                assert_eq!(words.len(), 2);
            }
            other => panic!("unexpected layer {other:?}"),
        }
    }

    #[test]
    fn test_generic_platform_has_no_ceiling() {
        let job = job().with_platform(Platform::Generic);
        let timeline = planner().plan(&job, 300.0, &[]).unwrap();
        assert_eq!(timeline.duration, 300.0);
    }

    #[test]
    fn test_no_screenshot_event_without_screenshot() {
        let job = NarrationJob::new("t2", "", "a.mp3", "peter");
        let timeline = planner().plan(&job, 20.0, &[]).unwrap();
        assert!(timeline.hook_window().is_none());
        assert_eq!(timeline.events.len(), 2);
    }

    #[test]
    fn test_z_order_independent_of_insertion() {
        let mut timeline = Timeline::new(10.0, 1080, 1920, 30);
        let caption = OverlayEvent {
            start: 0.0,
            end: 1.0,
            placement: Placement::Fill,
            layer: Layer::Caption {
                text: "hi".to_string(),
                words: vec![],
                line_breaks: vec![],
                animation: AnimationMode::Static,
            },
        };
        let avatar = OverlayEvent {
            start: 0.0,
            end: 10.0,
            placement: Placement::Fill,
            layer: Layer::Avatar { source: "a.png".into() },
        };
        let background = OverlayEvent {
            start: 0.0,
            end: 10.0,
            placement: Placement::Fill,
            layer: Layer::Background { source: "bg.mp4".into() },
        };

        timeline.push(caption);
        timeline.push(avatar);
        timeline.push(background);

        let order: Vec<_> = timeline.events.iter().map(OverlayEvent::kind).collect();
        assert_eq!(
            order,
            vec![OverlayKind::Background, OverlayKind::Avatar, OverlayKind::Caption]
        );
        for pair in timeline.events.windows(2) {
            assert!(pair[0].z_order() < pair[1].z_order());
        }
    }

    #[test]
    fn test_planning_is_idempotent() {
        let chunks = vec![chunk(&[("a", 0.0, 0.5)]), chunk(&[("b", 1.0, 1.5)])];
        let planner = planner();
        let first = planner.plan(&job(), 30.0, &chunks).unwrap();
        let second = planner.plan(&job(), 30.0, &chunks).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_audio_duration() {
        assert!(matches!(
            planner().plan(&job(), 0.0, &[]),
            Err(JobError::InvalidSpec(_))
        ));
        assert!(planner().plan(&job(), f64::NAN, &[]).is_err());
    }
}
