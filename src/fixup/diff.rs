//! Unified diff detection and line colouring.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::{Budget, Chunk, Segment, Segmenter};

static UNIFIED_DIFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?mi)^-{3} .+?[\r\n]+",
        r"^\+{3} .+?[\r\n]+",
        r"(?:^@@@? .+[\r\n]+(?:^ .*[\r\n]*$){0,3}(?:^[-+ ].*[\r\n]*)+(?:^ .*[\r\n]*$){0,3})+",
    ))
    .expect("diff pattern is valid")
});

/// Display colour of a diff line, chosen by its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffColor {
    Blue,
    Red,
    Green,
    Black,
    Grey,
}

impl DiffColor {
    pub fn for_line(line: &str) -> Self {
        match line.as_bytes().first() {
            Some(b'@') => DiffColor::Blue,
            Some(b'-') => DiffColor::Red,
            Some(b'+') => DiffColor::Green,
            Some(b' ') => DiffColor::Black,
            _ => DiffColor::Grey,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    /// Line text including its terminator
    pub text: String,
    pub color: DiffColor,
}

fn colour_lines(diff: &str) -> Vec<DiffLine> {
    diff.split_inclusive('\n')
        .map(|line| DiffLine {
            text: line.to_string(),
            color: DiffColor::for_line(line),
        })
        .collect()
}

/// Turns unified diffs into colourised blocks.
pub struct DiffSegmenter;

impl Segmenter for DiffSegmenter {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn segment(&self, raw: String, budget: &mut Budget, out: &mut Vec<Chunk>) {
        let mut rest = raw.as_str();
        while let Some(m) = UNIFIED_DIFF.find(rest) {
            if !budget.diffs.take() {
                break;
            }
            if m.start() > 0 {
                out.push(Chunk::Raw(rest[..m.start()].to_string()));
            }
            out.push(Chunk::Done(Segment::DiffBlock {
                lines: colour_lines(m.as_str()),
            }));
            rest = &rest[m.end()..];
        }
        if !rest.is_empty() {
            out.push(Chunk::Raw(rest.to_string()));
        }
    }
}
