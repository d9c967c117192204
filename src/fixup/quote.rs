//! Quote detection.
//!
//! A quote is one of:
//! - a ticket citation fenced by `---` lines,
//! - a cited block: a reply signal (attribution line or mobile signature)
//!   and/or a run of `>`-prefixed lines,
//! - a forwarded message: a dashed banner followed by header lines.
//!
//! Reply signals are locale specific and pluggable through [`QuotePatterns`].

use std::ops::Range;
use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};

use super::{Budget, Chunk, Segment, Segmenter};
use crate::config::QuotePatternConfig;

static TICKET_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\A---\r?\n(?:[^\r\n]*?\r?\n)*?---$").expect("ticket pattern is valid")
});

static QUOTED_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\A(?:^\s*>+[ \t]*[^\r\n]*\r*\n+)+").expect("quoted lines pattern is valid")
});

static FORWARD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\w+:\s+[^\r\n]+").expect("forward header pattern is valid")
});

static QUOTE_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:>*\s*\r?\n)+\z").expect("quote tail pattern is valid")
});

static BUILTIN: LazyLock<QuotePatterns> = LazyLock::new(|| {
    let mut patterns = QuotePatterns::empty();
    for (name, pattern) in BUILTIN_SIGNALS {
        patterns
            .push(name, pattern)
            .expect("built-in reply signal is valid");
    }
    patterns
});

const BUILTIN_SIGNALS: [(&str, &str); 5] = [
    ("dated", r"\d+-\d+-\d+\s+.+<\S+@\S+>:[ \t\r\n]+"),
    ("english", r"on\s+(?:.+|.+\n.+)\s+wrote:[\r?\n]+"),
    ("french", r"le\s+(?:.+|.+\n.+)\s+écrit:[\r?\n]+"),
    ("german", r".?am .+? schrieb\s+.+:[\r?\n]+"),
    (
        "mobile",
        r"(?:envoy[ée] de mon .+|sent from my .+|von meinem .+ gesendet)[ \t\r\n]+",
    ),
];

#[derive(Debug, Clone)]
struct SignalPattern {
    name: String,
    regex: Regex,
}

/// Ordered list of reply-signal patterns, matched case-insensitively at a line start.
#[derive(Debug, Clone)]
pub struct QuotePatterns {
    signals: Vec<SignalPattern>,
}

impl Default for QuotePatterns {
    fn default() -> Self {
        Self::builtin()
    }
}

impl QuotePatterns {
    pub fn empty() -> Self {
        Self {
            signals: Vec::new(),
        }
    }

    /// Dated citations, English, French and German attributions and mobile signatures.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Built-in patterns followed by configured ones.
    pub fn with_extra(extra: &[QuotePatternConfig]) -> Result<Self, regex::Error> {
        let mut patterns = Self::builtin();
        for entry in extra {
            patterns.push(&entry.name, &entry.pattern)?;
        }
        Ok(patterns)
    }

    pub fn push(&mut self, name: &str, pattern: &str) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(&format!(r"\A(?:{})", pattern))
            .case_insensitive(true)
            .multi_line(true)
            .build()?;
        self.signals.push(SignalPattern {
            name: name.to_string(),
            regex,
        });
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.name.as_str())
    }

    /// Length of the first signal matching at the very start of `text`.
    fn match_signal(&self, text: &str) -> Option<usize> {
        self.signals
            .iter()
            .find_map(|signal| signal.regex.find(text).map(|m| m.end()))
            .filter(|&len| len > 0)
    }
}

fn is_line_break(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

fn is_line_start(text: &str, pos: usize) -> bool {
    pos == 0 || is_line_break(text.as_bytes()[pos - 1])
}

fn newline_len(text: &str) -> usize {
    if text.starts_with("\r\n") {
        2
    } else if text.starts_with('\n') {
        1
    } else {
        0
    }
}

/// Splits quotes out of raw text into collapsible blocks.
pub struct QuoteSegmenter {
    patterns: Arc<QuotePatterns>,
    collapsed: bool,
}

impl QuoteSegmenter {
    pub fn new(patterns: Arc<QuotePatterns>, collapsed: bool) -> Self {
        Self {
            patterns,
            collapsed,
        }
    }

    /// Byte range of the first quote in `text`, if any.
    pub fn find_quote(&self, text: &str) -> Option<Range<usize>> {
        let bytes = text.as_bytes();
        for pos in 0..bytes.len() {
            let line_start = is_line_start(text, pos);
            let byte = bytes[pos];
            if !line_start && !is_line_break(byte) && byte != b'-' {
                continue;
            }
            if byte == b'-' {
                if let Some(m) = TICKET_CITATION.find(&text[pos..]) {
                    return Some(pos..pos + m.end());
                }
            }
            if let Some(end) = self.match_cited(text, pos) {
                return Some(pos..end);
            }
            if line_start {
                if let Some(len) = match_forwarded(&text[pos..]) {
                    return Some(pos..pos + len);
                }
            }
        }
        None
    }

    /// A run of reply signals and `>` blocks starting at `pos`.
    fn match_cited(&self, text: &str, pos: usize) -> Option<usize> {
        let mut cursor = pos;
        let mut matched = false;
        loop {
            let line_start = is_line_start(text, cursor);
            if let Some(end) = self.match_signal_block(text, cursor, line_start) {
                cursor = end;
                matched = true;
                continue;
            }
            if line_start {
                if let Some(m) = QUOTED_LINES.find(&text[cursor..]) {
                    cursor += m.end();
                    matched = true;
                    continue;
                }
            }
            break;
        }
        matched.then_some(cursor)
    }

    /// A reply signal at `cursor` (optionally after one line break).
    ///
    /// Unprefixed text following the signal is the top-posted original, so
    /// the quote then runs to the end of the text.
    fn match_signal_block(&self, text: &str, cursor: usize, line_start: bool) -> Option<usize> {
        let rest = &text[cursor..];
        let nl = newline_len(rest);
        let signal_end = (nl > 0)
            .then(|| self.patterns.match_signal(&rest[nl..]).map(|len| cursor + nl + len))
            .flatten()
            .or_else(|| {
                line_start
                    .then(|| self.patterns.match_signal(rest).map(|len| cursor + len))
                    .flatten()
            })?;

        let follows_unquoted = signal_end < text.len()
            && is_line_start(text, signal_end)
            && text.as_bytes()[signal_end] != b'>';
        Some(if follows_unquoted { text.len() } else { signal_end })
    }
}

/// A forwarded-message banner, e.g. `---------- Forwarded message ----------`,
/// followed by at least three header lines and a blank line. Runs to the end.
fn match_forwarded(text: &str) -> Option<usize> {
    let dashes = text.bytes().take_while(|&b| b == b'-').count();
    if !(5..=10).contains(&dashes) {
        return None;
    }
    let line_len = text.find(['\r', '\n'])?;
    let fence = &text[..dashes];
    let title = text[..line_len]
        .strip_prefix(fence)?
        .strip_prefix(' ')?
        .strip_suffix(fence)?
        .strip_suffix(' ')?;
    if title.is_empty() {
        return None;
    }

    let bytes = text.as_bytes();
    let mut cursor = line_len;
    while cursor < bytes.len() && is_line_break(bytes[cursor]) {
        cursor += 1;
    }

    let mut headers = 0;
    while headers < 10 {
        let Some(m) = FORWARD_HEADER.find(&text[cursor..]) else {
            break;
        };
        let line_end = cursor + m.end();
        let run = text[line_end..]
            .bytes()
            .take_while(|&b| is_line_break(b))
            .count();
        if run == 0 {
            break;
        }
        headers += 1;
        cursor = line_end + run;
        // The header block must end with a blank line and be followed by a body.
        if headers >= 3 && run >= 2 && (run - 2) + (text.len() - cursor) >= 1 {
            return Some(text.len());
        }
    }
    None
}

/// Split off trailing blank and bare `>` lines of a quote.
fn split_tail(quote: &str) -> (&str, &str) {
    match QUOTE_TAIL.find(quote) {
        Some(m) => quote.split_at(m.start()),
        None => (quote, ""),
    }
}

impl Segmenter for QuoteSegmenter {
    fn name(&self) -> &'static str {
        "quote"
    }

    fn enters_quotes(&self) -> bool {
        false
    }

    fn segment(&self, raw: String, budget: &mut Budget, out: &mut Vec<Chunk>) {
        let mut rest = raw.as_str();
        while let Some(range) = self.find_quote(rest) {
            if !budget.quotes.take() {
                break;
            }
            if range.start > 0 {
                out.push(Chunk::Raw(rest[..range.start].to_string()));
            }
            let (body, tail) = split_tail(&rest[range.clone()]);
            if !body.is_empty() {
                out.push(Chunk::Quote {
                    collapsed: self.collapsed,
                    inner: vec![Chunk::Raw(body.to_string())],
                });
            }
            if !tail.is_empty() {
                out.push(Chunk::Done(Segment::plain(tail)));
            }
            rest = &rest[range.end..];
        }
        if !rest.is_empty() {
            out.push(Chunk::Raw(rest.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> QuoteSegmenter {
        QuoteSegmenter::new(Arc::new(QuotePatterns::builtin()), true)
    }

    fn quoted<'a>(text: &'a str) -> Option<&'a str> {
        segmenter().find_quote(text).map(|r| &text[r])
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<_> = QuotePatterns::builtin().names().map(String::from).collect();
        assert_eq!(names, vec!["dated", "english", "french", "german", "mobile"]);
    }

    #[test]
    fn test_gt_prefixed_lines() {
        assert_eq!(quoted("hi\n> a\n> b\nreply\n"), Some("> a\n> b\n"));
    }

    #[test]
    fn test_gt_must_start_a_line() {
        assert_eq!(quoted("a > b\n"), None);
    }

    #[test]
    fn test_english_attribution_then_quote() {
        let text = "Sure.\n\nOn Tue, 3 Mar 2020, Bob wrote:\n> question\nanswer\n";
        assert_eq!(
            quoted(text),
            Some("\nOn Tue, 3 Mar 2020, Bob wrote:\n> question\n")
        );
    }

    #[test]
    fn test_attribution_is_case_insensitive() {
        assert!(quoted("ON monday, X WROTE:\n> y\n").is_some());
    }

    #[test]
    fn test_french_and_german_attributions() {
        assert!(quoted("Le 3 mars, Anne a écrit:\n> salut\n").is_some());
        assert!(quoted("Am 3. März schrieb Hans <h@x.de>:\n> hallo\n").is_some());
    }

    #[test]
    fn test_dated_citation() {
        assert!(quoted("2020-01-02 10:00 GMT+1 Carol <c@x.org>:\n> text\n").is_some());
    }

    #[test]
    fn test_top_post_swallows_rest() {
        let text = "reply\n\nSent from my phone\noriginal text\nmore\n";
        assert_eq!(quoted(text), Some("\nSent from my phone\noriginal text\nmore\n"));
    }

    #[test]
    fn test_ticket_citation() {
        let text = "note\n---\nticket body\n---\nafter\n";
        assert_eq!(quoted(text), Some("---\nticket body\n---"));
    }

    #[test]
    fn test_forwarded_message() {
        let text = "FYI\n---------- Forwarded message ----------\nFrom: A <a@x>\nDate: today\nSubject: hi\nTo: b@x\n\nbody\n";
        assert_eq!(
            quoted(text),
            Some("---------- Forwarded message ----------\nFrom: A <a@x>\nDate: today\nSubject: hi\nTo: b@x\n\nbody\n")
        );
    }

    #[test]
    fn test_forwarded_needs_matching_fences() {
        let text = "----- Forwarded message ------\nFrom: a\nDate: b\nSubject: c\n\nbody\n";
        assert_eq!(quoted(text), None);
    }

    #[test]
    fn test_tail_split() {
        assert_eq!(split_tail("> a\n>\n\n"), ("> a", "\n>\n\n"));
        assert_eq!(split_tail("---\nx\n---"), ("---\nx\n---", ""));
    }

    #[test]
    fn test_extra_pattern_is_used() {
        let extra = vec![QuotePatternConfig {
            name: "dutch".into(),
            pattern: r"op .+ schreef .+:[\r\n]+".into(),
        }];
        let patterns = QuotePatterns::with_extra(&extra).unwrap();
        let segmenter = QuoteSegmenter::new(Arc::new(patterns), true);
        let text = "Op maandag schreef Jan:\n> hoi\n";
        assert_eq!(segmenter.find_quote(text), Some(0..text.len()));
        assert_eq!(segmenter.patterns.names().last(), Some("dutch"));
    }

    #[test]
    fn test_segment_respects_cap() {
        let mut budget = Budget::new(&super::super::FixupLimits {
            max_quotes: 1,
            ..Default::default()
        });
        let mut out = Vec::new();
        segmenter().segment("> a\nx\n> b\n".to_string(), &mut budget, &mut out);
        let quotes = out.iter().filter(|c| matches!(c, Chunk::Quote { .. })).count();
        assert_eq!(quotes, 1);
        assert_eq!(out.last(), Some(&Chunk::Raw("x\n> b\n".to_string())));
    }
}
