//! Signature trailer removal for the chatty layout.
//!
//! A trailer starts at a line consisting of exactly `--` and runs to the end
//! of the chunk. Personal signatures are cut; ticket-style footers (fenced by
//! matching dash lines) are kept.

use std::sync::LazyLock;

use regex::Regex;

use super::{Budget, Chunk, Segmenter};

static TRAILER_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--[\r\n]+").expect("trailer pattern is valid"));

static LINE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\r?\n").expect("line split pattern is valid"));

/// What to do with a trailer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerVerdict {
    /// Personal signature, removed
    Strip,
    /// Structured footer, kept verbatim
    Keep,
    /// Dash-fenced block that is not clearly a footer, kept with `|||` markers
    Ambiguous,
}

impl TrailerVerdict {
    fn apply(self, block: &str) -> String {
        match self {
            TrailerVerdict::Strip => String::new(),
            TrailerVerdict::Keep => block.to_string(),
            TrailerVerdict::Ambiguous => format!("|||{}|||", block),
        }
    }
}

fn is_dash_fence(line: &str) -> bool {
    (6..=72).contains(&line.len()) && line.bytes().all(|b| b == b'-')
}

/// Classify a trailer block, delimiter line included.
pub fn classify_trailer(block: &str) -> TrailerVerdict {
    let content = block
        .strip_prefix("--")
        .unwrap_or(block)
        .trim_start_matches(['\r', '\n']);
    let mut lines: Vec<&str> = LINE_SPLIT.split(content).collect();
    lines.reverse();

    let mut first = lines.pop().unwrap_or_default();
    while first.is_empty() && !lines.is_empty() {
        first = lines.pop().unwrap_or_default();
    }
    if lines.is_empty() || first == "--" {
        return TrailerVerdict::Strip;
    }

    // `lines` is reversed, so the block's last line is at the front.
    let mut remaining: &[&str] = &lines;
    let mut last = "";
    while let Some((&line, rest)) = remaining.split_first() {
        last = line;
        remaining = rest;
        if !line.is_empty() {
            break;
        }
    }
    if last == first {
        return TrailerVerdict::Keep;
    }

    if first.starts_with("---") && remaining.contains(&first) {
        return TrailerVerdict::Ambiguous;
    }
    if is_dash_fence(first) {
        return TrailerVerdict::Keep;
    }
    TrailerVerdict::Strip
}

/// Cuts personal signatures out of raw text outside of quotes.
pub struct TrailerSegmenter;

impl Segmenter for TrailerSegmenter {
    fn name(&self) -> &'static str {
        "trailer"
    }

    fn enters_quotes(&self) -> bool {
        false
    }

    fn segment(&self, raw: String, budget: &mut Budget, out: &mut Vec<Chunk>) {
        let start = match TRAILER_START.find(&raw) {
            Some(m) if budget.trailers.take() => m.start(),
            _ => {
                out.push(Chunk::Raw(raw));
                return;
            }
        };
        let (head, block) = raw.split_at(start);
        let verdict = classify_trailer(block);
        tracing::trace!(?verdict, "Classified trailer");
        out.push(Chunk::Raw(format!("{}{}", head, verdict.apply(block))));
    }
}
