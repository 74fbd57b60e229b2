//! Script → cue timing.
//!
//! Each non-blank script line becomes one on-screen cue. A line's share of the
//! target duration is proportional to its word count; there is no alignment
//! against the narration audio.

use crate::error::{ComposeError, ComposeResult};
use serde::{Deserialize, Serialize};

/// Largest drift tolerated between the accumulated last cue end and the
/// target duration before the end is clamped.
pub const CUE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCue {
    /// Line as written in the script.
    pub text: String,
    /// `text` escaped for direct embedding in an ffmpeg filtergraph.
    pub escaped: String,
    pub start: f64,
    pub end: f64,
}

impl ScriptCue {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

pub fn word_count(line: &str) -> usize {
    line.split_whitespace().count()
}

/// Script lines that carry at least one word, trimmed, in order.
pub fn script_lines(script: &str) -> Vec<&str> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| word_count(line) > 0)
        .collect()
}

/// Splits `script` into cues covering `[0, duration]`.
pub fn plan_cues(script: &str, duration: f64) -> ComposeResult<Vec<ScriptCue>> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ComposeError::InvalidPlan(format!(
            "target duration must be a positive number of seconds, got {duration}"
        )));
    }

    let lines = script_lines(script);
    if lines.is_empty() {
        return Err(ComposeError::EmptyScript);
    }

    let total_weight: usize = lines.iter().map(|line| word_count(line)).sum();

    let mut cues = Vec::with_capacity(lines.len());
    let mut cursor = 0.0;
    for line in lines {
        let share = duration * word_count(line) as f64 / total_weight as f64;
        let start = cursor;
        let end = start + share;
        cues.push(ScriptCue {
            text: line.to_string(),
            escaped: escape_drawtext(line),
            start,
            end,
        });
        cursor = end;
    }

    if let Some(last) = cues.last_mut() {
        if (last.end - duration).abs() > CUE_EPSILON {
            tracing::debug!(
                drift = last.end - duration,
                "clamping last cue end to target duration"
            );
            last.end = duration;
        }
    }

    Ok(cues)
}

/// Escapes text for a drawtext `text=` value inside `-filter_complex`.
///
/// ffmpeg unescapes twice: once when splitting the filtergraph and once when
/// splitting the filter's `key=value` options. The option level is applied
/// first, then the graph level on top of it.
pub fn escape_drawtext(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    escape_graph_level(&escape_option_level(cleaned.trim()))
}

fn escape_option_level(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_graph_level(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
