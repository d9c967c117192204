//! Body fixup engine: turns a raw plain-text email body into typed segments.
//!
//! The engine is an ordered pipeline of [`Segmenter`] stages. Each stage only
//! looks at raw text chunks and passes already-typed chunks through untouched,
//! so nothing is ever processed twice. The stage order is:
//!
//! 1. quotes (collapsible blocks, the outermost structure)
//! 2. trailers (chatty layout only, never inside quotes)
//! 3. diffs (chatty layout only)
//! 4. URLs
//!
//! Quote blocks carry their own inner chunks, which the diff and URL stages
//! descend into.

mod diff;
mod quote;
mod trailer;
mod url;

pub use diff::{DiffColor, DiffLine, DiffSegmenter};
pub use quote::{QuotePatterns, QuoteSegmenter};
pub use trailer::{classify_trailer, TrailerSegmenter, TrailerVerdict};
pub use url::UrlSegmenter;

use std::sync::Arc;

use serde::Serialize;

use crate::config::{
    FixupConfig, MAX_DIFFS_PER_BODY, MAX_QUOTES_PER_BODY, MAX_TRAILER_CUTS_PER_BODY,
    MAX_URLS_PER_BODY,
};

/// One typed span of a rendered body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    PlainText { text: String },
    Link { url: String, text: String },
    QuoteBlock { collapsed: bool, segments: Vec<Segment> },
    DiffBlock { lines: Vec<DiffLine> },
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Segment::PlainText { text: text.into() }
    }

    /// Textual content of this segment, as it appeared in the body.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Segment::PlainText { text } | Segment::Link { text, .. } => out.push_str(text),
            Segment::QuoteBlock { segments, .. } => {
                for segment in segments {
                    segment.write_text(out);
                }
            }
            Segment::DiffBlock { lines } => {
                for line in lines {
                    out.push_str(&line.text);
                }
            }
        }
    }

    /// For quote blocks: the quoted text without its attribution line and `>` markers.
    pub fn unquoted_text(&self) -> Option<String> {
        let Segment::QuoteBlock { .. } = self else {
            return None;
        };
        let text = self.text();
        let mut lines = text.trim_start_matches(['\r', '\n']).lines().peekable();
        if lines.peek().is_some_and(|first| !first.trim_start().starts_with('>')) {
            lines.next();
        }
        let body: Vec<&str> = lines
            .map(|line| {
                let stripped = line.trim_start().trim_start_matches('>');
                stripped.strip_prefix(' ').unwrap_or(stripped)
            })
            .collect();
        Some(body.join("\n").trim_matches(['\r', '\n']).to_string())
    }

    /// Remove one trailing newline from the last textual leaf, if it ends with one.
    fn pop_trailing_newline(&mut self) -> bool {
        match self {
            Segment::PlainText { text } => text.pop_if_newline(),
            Segment::Link { .. } => false,
            Segment::QuoteBlock { segments, .. } => pop_trailing_newline(segments),
            Segment::DiffBlock { lines } => {
                let popped = lines
                    .last_mut()
                    .is_some_and(|line| line.text.pop_if_newline());
                if lines.last().is_some_and(|line| line.text.is_empty()) {
                    lines.pop();
                }
                popped
            }
        }
    }

    fn is_empty_text(&self) -> bool {
        match self {
            Segment::PlainText { text } => text.is_empty(),
            Segment::DiffBlock { lines } => lines.is_empty(),
            _ => false,
        }
    }
}

trait PopNewline {
    fn pop_if_newline(&mut self) -> bool;
}

impl PopNewline for String {
    fn pop_if_newline(&mut self) -> bool {
        if self.ends_with('\n') {
            self.pop();
            true
        } else {
            false
        }
    }
}

fn pop_trailing_newline(segments: &mut Vec<Segment>) -> bool {
    let Some(last) = segments.last_mut() else {
        return false;
    };
    let popped = last.pop_trailing_newline();
    if last.is_empty_text() {
        segments.pop();
    }
    popped
}

/// Concatenated textual content of a segment list.
pub fn segments_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        segment.write_text(&mut out);
    }
    out
}

/// Layout flags that decide which stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixupMode {
    /// Condensed layout: trailer cuts and diff colouring, quotes always collapsed
    pub chatty: bool,
    /// User preference for collapsing quotes in the classic layout
    pub compact_quotes: bool,
}

impl FixupMode {
    /// Quotes are collapsed in chatty mode regardless of preference.
    pub fn hides_quotes(&self) -> bool {
        self.compact_quotes || self.chatty
    }
}

/// Per-body match caps. Beyond a cap, remaining text passes through unprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupLimits {
    pub max_urls: usize,
    pub max_quotes: usize,
    pub max_diffs: usize,
    pub max_trailer_cuts: usize,
}

impl Default for FixupLimits {
    fn default() -> Self {
        Self {
            max_urls: MAX_URLS_PER_BODY,
            max_quotes: MAX_QUOTES_PER_BODY,
            max_diffs: MAX_DIFFS_PER_BODY,
            max_trailer_cuts: MAX_TRAILER_CUTS_PER_BODY,
        }
    }
}

impl From<&FixupConfig> for FixupLimits {
    fn from(config: &FixupConfig) -> Self {
        Self {
            max_urls: config.max_urls,
            max_quotes: config.max_quotes,
            max_diffs: config.max_diffs,
            max_trailer_cuts: config.max_trailer_cuts,
        }
    }
}

/// Everything the engine needs to fix up one body.
#[derive(Debug, Clone)]
pub struct FixupOptions {
    pub mode: FixupMode,
    pub limits: FixupLimits,
    pub patterns: Arc<QuotePatterns>,
}

impl FixupOptions {
    /// Options with the built-in quote patterns and default caps.
    pub fn new(mode: FixupMode) -> Self {
        Self {
            mode,
            limits: FixupLimits::default(),
            patterns: Arc::new(QuotePatterns::builtin()),
        }
    }

    pub fn from_config(mode: FixupMode, config: &FixupConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            mode,
            limits: FixupLimits::from(config),
            patterns: Arc::new(QuotePatterns::with_extra(&config.quote_patterns)?),
        })
    }

    pub fn with_mode(&self, mode: FixupMode) -> Self {
        Self {
            mode,
            limits: self.limits,
            patterns: Arc::clone(&self.patterns),
        }
    }
}

/// A cap counter for one kind of match.
#[derive(Debug, Clone, Copy)]
pub struct Allowance {
    used: usize,
    max: usize,
}

impl Allowance {
    fn new(max: usize) -> Self {
        Self { used: 0, max }
    }

    /// Consume one unit; false once the cap is reached.
    pub fn take(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

/// Remaining match allowances for a single body.
#[derive(Debug, Clone)]
pub struct Budget {
    pub urls: Allowance,
    pub quotes: Allowance,
    pub diffs: Allowance,
    pub trailers: Allowance,
}

impl Budget {
    pub fn new(limits: &FixupLimits) -> Self {
        Self {
            urls: Allowance::new(limits.max_urls),
            quotes: Allowance::new(limits.max_quotes),
            diffs: Allowance::new(limits.max_diffs),
            trailers: Allowance::new(limits.max_trailer_cuts),
        }
    }
}

/// Work-in-progress unit flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Text no stage has claimed yet
    Raw(String),
    /// Finished segment, passed through by every later stage
    Done(Segment),
    /// Quote block whose inner chunks are still open to inner stages
    Quote { collapsed: bool, inner: Vec<Chunk> },
}

/// One stage of the fixup pipeline.
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this stage also processes the inner text of quote blocks.
    fn enters_quotes(&self) -> bool {
        true
    }

    /// Split one raw chunk, appending the result to `out`.
    fn segment(&self, raw: String, budget: &mut Budget, out: &mut Vec<Chunk>);
}

fn run_stage(stage: &dyn Segmenter, chunks: Vec<Chunk>, budget: &mut Budget) -> Vec<Chunk> {
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match chunk {
            Chunk::Raw(text) if !text.is_empty() => stage.segment(text, budget, &mut out),
            Chunk::Raw(_) => {}
            Chunk::Quote { collapsed, inner } if stage.enters_quotes() => {
                let inner = run_stage(stage, inner, budget);
                out.push(Chunk::Quote { collapsed, inner });
            }
            other => out.push(other),
        }
    }
    out
}

fn into_segments(chunks: Vec<Chunk>) -> Vec<Segment> {
    chunks
        .into_iter()
        .filter_map(|chunk| match chunk {
            Chunk::Raw(text) if text.is_empty() => None,
            Chunk::Raw(text) => Some(Segment::PlainText { text }),
            Chunk::Done(segment) => Some(segment),
            Chunk::Quote { collapsed, inner } => Some(Segment::QuoteBlock {
                collapsed,
                segments: into_segments(inner),
            }),
        })
        .collect()
}

/// The ordered list of stages for one layout mode.
pub struct Pipeline {
    stages: Vec<Box<dyn Segmenter>>,
}

impl Pipeline {
    pub fn for_mode(mode: FixupMode, patterns: Arc<QuotePatterns>) -> Self {
        let mut stages: Vec<Box<dyn Segmenter>> =
            vec![Box::new(QuoteSegmenter::new(patterns, mode.hides_quotes()))];
        if mode.chatty {
            stages.push(Box::new(TrailerSegmenter));
            stages.push(Box::new(DiffSegmenter));
        }
        stages.push(Box::new(UrlSegmenter));
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, text: String, limits: &FixupLimits) -> Vec<Segment> {
        let mut budget = Budget::new(limits);
        let mut chunks = vec![Chunk::Raw(text)];
        for stage in &self.stages {
            chunks = run_stage(stage.as_ref(), chunks, &mut budget);
        }
        into_segments(chunks)
    }
}

/// Segment a raw email body for rendering.
///
/// When quotes are not being collapsed (classic layout with `compact_quotes`
/// off) the body is returned as a single plain-text segment.
pub fn fixup_body(raw: &str, options: &FixupOptions) -> Vec<Segment> {
    if !options.mode.hides_quotes() {
        if raw.is_empty() {
            return Vec::new();
        }
        return vec![Segment::plain(raw)];
    }

    // Quote patterns expect every line, including the last, to be terminated.
    let padded = !raw.ends_with('\n');
    let mut text = raw.to_string();
    if padded {
        text.push('\n');
    }

    let pipeline = Pipeline::for_mode(options.mode, Arc::clone(&options.patterns));
    let mut segments = pipeline.run(text, &options.limits);
    if padded {
        pop_trailing_newline(&mut segments);
    }
    segments
}
