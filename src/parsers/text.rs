use crate::parsers::ParseResult;
use regex::Regex;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>()\]\[]+"#).expect("valid regex"));

/// Configuration options for text parsing
#[derive(Debug, Clone, Copy)]
pub struct TextParserOptions {
    /// Whether to keep paragraph breaks (a single blank line between paragraphs)
    pub preserve_paragraphs: bool,
    /// Whether to report bare URLs found in the text as links
    pub detect_urls: bool,
}

impl Default for TextParserOptions {
    fn default() -> Self {
        Self {
            preserve_paragraphs: false,
            detect_urls: true,
        }
    }
}

/// Parses plain text content with default options
pub fn parse(text: &str) -> ParseResult {
    parse_with_options(text, &TextParserOptions::default())
}

/// Parses text with specific options
pub fn parse_with_options(text: &str, options: &TextParserOptions) -> ParseResult {
    if text.trim().is_empty() {
        return ParseResult::default();
    }

    let paragraphs = split_into_paragraphs(text);
    let separator = if options.preserve_paragraphs { "\n\n" } else { " " };
    let content = paragraphs
        .iter()
        .map(|para| normalize_whitespace(&para.join(" ")))
        .collect::<Vec<_>>()
        .join(separator);

    let links = if options.detect_urls {
        extract_urls(text)
    } else {
        Vec::new()
    };

    ParseResult::new(content, links)
}

/// Splits text into paragraphs of trimmed lines, using blank lines as boundaries
pub fn split_into_paragraphs(text: &str) -> Vec<Vec<&str>> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(trimmed);
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Collapses every whitespace run into a single space
pub fn normalize_whitespace(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Absolute http(s) URLs appearing in the text, in order, without trailing punctuation
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .collect()
}
