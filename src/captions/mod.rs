//! Caption layout: grouping timed words into on-screen chunks
//!
//! The greedy [`layout`] pass decides which words share a caption. The
//! [`CaptionLayout`] wrapper adds presentation metadata (word wrap, animation,
//! casing) from configuration, and [`ass`] turns the planned captions into an
//! ASS subtitle document for burning in.

pub mod ass;

use serde::{Deserialize, Serialize};

use crate::align::WordTimestamp;
use crate::config::CaptionConfig;

pub use ass::{AssGenerator, CaptionStyle};

/// How a caption appears on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    /// Progressive word highlight synced to speech
    #[default]
    Karaoke,
    /// Whole-chunk fade in and out
    Fade,
    /// Plain text for the chunk's window
    Static,
}

/// A group of consecutive words displayed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionChunk {
    pub words: Vec<WordTimestamp>,
    /// Text as displayed, with `\n` between wrapped lines
    pub display_text: String,
    /// First word's start
    pub start: f64,
    /// Last word's end
    pub end: f64,
    pub line_count: usize,
    /// Word indices that begin a new line (never contains 0)
    pub line_breaks: Vec<usize>,
    pub animation: AnimationMode,
}

impl CaptionChunk {
    fn from_words(words: Vec<WordTimestamp>) -> Self {
        let start = words.first().map_or(0.0, |w| w.start);
        let end = words.last().map_or(0.0, |w| w.end);
        let display_text = words
            .iter()
            .map(|w| w.word.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            words,
            display_text,
            start,
            end,
            line_count: 1,
            line_breaks: Vec::new(),
            animation: AnimationMode::default(),
        }
    }

    /// Re-wrap the display text so no line exceeds `max_chars` (single long words excepted).
    pub fn wrap(&mut self, max_chars: usize) {
        let tokens: Vec<&str> = self.words.iter().map(|w| w.word.as_str()).collect();
        self.line_breaks = wrap_breaks(&tokens, max_chars);

        let mut text = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                text.push(if self.line_breaks.contains(&i) { '\n' } else { ' ' });
            }
            text.push_str(token);
        }

        self.display_text = text;
        self.line_count = self.line_breaks.len() + 1;
    }
}

/// Greedy grouping of words into caption chunks.
///
/// A chunk grows while it has fewer than `max_words_per_line` words and the
/// silence before the next word is at most `max_gap_seconds`.
#[must_use]
pub fn layout(words: &[WordTimestamp], max_words_per_line: usize, max_gap_seconds: f64) -> Vec<CaptionChunk> {
    let max_words = max_words_per_line.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<WordTimestamp> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        current.push(word.clone());

        let close = match words.get(i + 1) {
            None => true,
            Some(next) => current.len() >= max_words || next.start - word.end > max_gap_seconds,
        };

        if close {
            chunks.push(CaptionChunk::from_words(std::mem::take(&mut current)));
        }
    }

    chunks
}

/// Configured caption layout pass
#[derive(Debug, Clone)]
pub struct CaptionLayout {
    pub max_words_per_line: usize,
    pub max_gap_seconds: f64,
    pub max_chars_per_line: usize,
    pub animation: AnimationMode,
    pub uppercase: bool,
}

impl CaptionLayout {
    #[must_use]
    pub fn from_config(config: &CaptionConfig) -> Self {
        Self {
            max_words_per_line: config.max_words_per_line,
            max_gap_seconds: config.max_gap_seconds,
            max_chars_per_line: config.max_chars_per_line,
            animation: config.animation,
            uppercase: config.uppercase,
        }
    }

    #[must_use]
    pub fn layout(&self, words: &[WordTimestamp]) -> Vec<CaptionChunk> {
        let mut chunks = layout(words, self.max_words_per_line, self.max_gap_seconds);

        for chunk in &mut chunks {
            if self.uppercase {
                for word in &mut chunk.words {
                    word.word = word.word.to_uppercase();
                }
            }
            chunk.wrap(self.max_chars_per_line);
            chunk.animation = self.animation;
        }

        chunks
    }
}

/// Word indices where a new line starts when wrapping at `max_chars`.
fn wrap_breaks(tokens: &[&str], max_chars: usize) -> Vec<usize> {
    let mut breaks = Vec::new();
    let mut line_len = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        let len = token.chars().count();
        if line_len == 0 {
            line_len = len;
        } else if line_len + 1 + len <= max_chars {
            line_len += 1 + len;
        } else {
            breaks.push(i);
            line_len = len;
        }
    }

    breaks
}
