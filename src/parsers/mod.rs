pub mod html;
pub mod text;

#[cfg(test)]
mod tests;

/// Enum to represent different types of page content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserType {
    /// HTML parser
    Html,
    /// Plain text parser
    Text,
}

impl ParserType {
    /// Determines the parser type from a response content type, falling back to the URL
    pub fn detect(content_type: Option<&str>, url: &str) -> Self {
        if let Some(ct) = content_type {
            let ct = ct.to_ascii_lowercase();
            if ct.starts_with("text/html") || ct.contains("xhtml") {
                return ParserType::Html;
            }
            if ct.starts_with("text/") {
                ::log::debug!("Classifying as Text ({}): {}", ct, url);
                return ParserType::Text;
            }
        }

        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".md") || path.ends_with(".yaml") || path.ends_with(".yml") {
            ::log::debug!("Classifying as Text: {}", url);
            ParserType::Text
        } else {
            ParserType::Html
        }
    }
}

/// Result of parsing content
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Extracted visible text
    pub content: String,
    /// Link targets as written in the document
    pub links: Vec<String>,
    /// Sources of embedded media elements (audio, video)
    pub media: Vec<String>,
}

impl ParseResult {
    /// Creates a new parse result with the given content and links
    pub fn new(content: String, links: Vec<String>) -> Self {
        Self {
            content,
            links,
            media: Vec::new(),
        }
    }
}

/// Main parser that delegates to specific format parsers
pub struct Parser;

impl Parser {
    /// Parse content based on the parser type
    pub fn parse(content: &str, parser_type: ParserType) -> ParseResult {
        match parser_type {
            ParserType::Html => html::parse(content),
            ParserType::Text => text::parse(content),
        }
    }

    /// Determine the parser type and then parse content
    pub fn parse_response(content: &str, content_type: Option<&str>, url: &str) -> ParseResult {
        Self::parse(content, ParserType::detect(content_type, url))
    }
}
