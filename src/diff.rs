//! Set-based line diff between two normalized snapshots, rendered as a short
//! human-readable summary.
//!
//! Lines are compared as sets: reordering existing lines yields no entries.
//! Each side keeps at most [`MAX_LINES_PER_SECTION`] entries, each cut to
//! [`MAX_LINE_CHARS`] characters, and the rendered block never exceeds the
//! caller's character budget.

use std::collections::HashSet;

pub const DEFAULT_MAX_CHARS: usize = 800;
pub const MAX_LINES_PER_SECTION: usize = 5;
pub const MAX_LINE_CHARS: usize = 180;

pub const ADDED_HEADER: &str = "++ Added:";
pub const REMOVED_HEADER: &str = "-- Removed:";
/// Rendered when the digest changed but no line was added or removed.
pub const NO_VISIBLE_CHANGES: &str = "(Minor changes or reordering)";

const LINE_ELLIPSIS: char = '…';
const BLOCK_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    /// New lines in new-text order, capped and truncated.
    pub added_lines: Vec<String>,
    /// Vanished lines in old-text order, capped and truncated.
    pub removed_lines: Vec<String>,
    pub rendered_text: String,
}

impl DiffSummary {
    pub fn first_added_line(&self) -> Option<&str> {
        self.added_lines.first().map(String::as_str)
    }

    pub fn is_cosmetic(&self) -> bool {
        self.added_lines.is_empty() && self.removed_lines.is_empty()
    }
}

pub fn summarize_lines(old_text: Option<&str>, new_text: &str, max_chars: usize) -> DiffSummary {
    let old_lines = split_lines(old_text.unwrap_or_default());
    let new_lines = split_lines(new_text);

    let old_set: HashSet<&str> = old_lines.iter().copied().collect();
    let new_set: HashSet<&str> = new_lines.iter().copied().collect();

    let added_lines = capped_difference(&new_lines, &old_set);
    let removed_lines = capped_difference(&old_lines, &new_set);

    let rendered_text = render(&added_lines, &removed_lines, max_chars);

    DiffSummary {
        added_lines,
        removed_lines,
        rendered_text,
    }
}

/// Rendered summary text only; see [`summarize_lines`].
pub fn summarize(old_text: Option<&str>, new_text: &str, max_chars: usize) -> String {
    summarize_lines(old_text, new_text, max_chars).rendered_text
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(['\n', '\r']).collect()
}

fn capped_difference(lines: &[&str], other: &HashSet<&str>) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty() && !other.contains(*line))
        .take(MAX_LINES_PER_SECTION)
        .map(|line| truncate_line(line, MAX_LINE_CHARS))
        .collect()
}

fn render(added: &[String], removed: &[String], max_chars: usize) -> String {
    let mut out = String::new();
    if !added.is_empty() {
        out.push_str(ADDED_HEADER);
        out.push('\n');
        for line in added {
            out.push_str("+ ");
            out.push_str(line);
            out.push('\n');
        }
    }
    if !removed.is_empty() {
        out.push_str(REMOVED_HEADER);
        out.push('\n');
        for line in removed {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }
    }

    let out = out.trim();
    if out.is_empty() {
        return clamp_block(NO_VISIBLE_CHANGES, max_chars);
    }
    clamp_block(out, max_chars)
}

fn truncate_line(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_owned();
    }
    let mut out: String = line.chars().take(width.saturating_sub(1)).collect();
    out.push(LINE_ELLIPSIS);
    out
}

fn clamp_block(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    if max_chars < BLOCK_ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text
        .chars()
        .take(max_chars - BLOCK_ELLIPSIS.len())
        .collect();
    out.push_str(BLOCK_ELLIPSIS);
    out
}
