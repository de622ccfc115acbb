//! Timing repair for speech model output.

use super::WordTimestamp;

/// Spread a segment's words over its window, weighted by character length.
///
/// The first word starts at `start` and the last ends at `end` exactly.
#[must_use]
pub fn distribute_proportionally(start: f64, end: f64, text: &str) -> Vec<WordTimestamp> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let weights: Vec<usize> = tokens.iter().map(|t| t.chars().count().max(1)).collect();
    let total: usize = weights.iter().sum();
    let span = (end - start).max(0.0);

    let mut words = Vec::with_capacity(tokens.len());
    let mut consumed = 0usize;
    let mut cursor = start;

    for (i, (token, weight)) in tokens.iter().zip(&weights).enumerate() {
        consumed += weight;
        let word_end = if i == tokens.len() - 1 {
            end.max(start)
        } else {
            start + span * consumed as f64 / total as f64
        };
        words.push(WordTimestamp::new(*token, cursor, word_end));
        cursor = word_end;
    }

    words
}

/// Force `start_i <= end_i <= start_{i+1}`.
///
/// Overlaps are resolved by cutting the earlier word short, unless the later
/// word starts before the earlier one, in which case the later word is pushed.
pub fn enforce_monotonic(words: &mut [WordTimestamp]) {
    for i in 0..words.len() {
        if i > 0 {
            let (prev_start, prev_end) = (words[i - 1].start, words[i - 1].end);
            if words[i].start < prev_end {
                if words[i].start >= prev_start {
                    words[i - 1].end = words[i].start;
                } else {
                    words[i].start = prev_end;
                }
            }
        }
        if words[i].end < words[i].start {
            words[i].end = words[i].start;
        }
    }
}
