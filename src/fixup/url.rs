//! URL linkification.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use super::{Budget, Chunk, Segment, Segmenter};

/// Scheme, optional credentials, dotted host or IP octet, optional port and path.
/// Trailing sentence punctuation stays outside the link.
static URL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(concat!(
        r"(",
        r"(?:[a-z]+://)",
        r"(?:\S+(?::\S*)?@)?",
        r"(?:",
        r"(?:[01][0-9][0-9]|2[0-4][0-9]|25[0-5])",
        r"|",
        r"(?:(?:[a-z\x{a1}-\x{ffff}0-9]-*)*[a-z\x{a1}-\x{ffff}0-9]+)",
        r"(?:\.(?:[a-z\x{a1}-\x{ffff}0-9]-*)*[a-z\x{a1}-\x{ffff}0-9]+)*",
        r"(?:\.[a-z\x{a1}-\x{ffff}]{2,})",
        r"\.?",
        r")",
        r"(?::\d{2,5})?",
        r"/?",
        r"(?:[/?#]?(?:[^,<>()\[\] \t\r\n]|<[^:\s]*?>|\([^:\s]*?\)|\[[^:\s]*?\])*)?",
        r")\.?\b",
    ))
    .case_insensitive(true)
    .multi_line(true)
    .size_limit(64 * (1 << 20))
    .build()
    .expect("URL pattern is valid")
});

/// Schemes that become links; anything else matched by [`URL`] stays text.
const LINKABLE_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

fn is_linkable(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        LINKABLE_SCHEMES
            .iter()
            .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
    })
}

/// Turns URLs into link segments.
pub struct UrlSegmenter;

impl Segmenter for UrlSegmenter {
    fn name(&self) -> &'static str {
        "url"
    }

    fn segment(&self, raw: String, budget: &mut Budget, out: &mut Vec<Chunk>) {
        let mut rest = raw.as_str();
        // Bytes at the start of `rest` already scanned and kept as text
        let mut scanned = 0;
        while let Some(url) = URL.captures(&rest[scanned..]).and_then(|caps| caps.get(1)) {
            let (start, end) = (scanned + url.start(), scanned + url.end());
            if !is_linkable(url.as_str()) {
                scanned = end;
                continue;
            }
            if !budget.urls.take() {
                break;
            }
            if start > 0 {
                out.push(Chunk::Raw(rest[..start].to_string()));
            }
            out.push(Chunk::Done(Segment::Link {
                url: url.as_str().to_string(),
                text: url.as_str().to_string(),
            }));
            rest = &rest[end..];
            scanned = 0;
        }
        if !rest.is_empty() {
            out.push(Chunk::Raw(rest.to_string()));
        }
    }
}
