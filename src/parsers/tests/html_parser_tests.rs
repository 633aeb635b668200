use crate::parsers::{Parser, ParserType, html};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_scripts_and_styles() {
        let input = r#"<html><head><style>body { color: red }</style></head>
            <body><p>Find the   secret</p><script>var x = "hidden";</script>
            <noscript>enable js</noscript><p>code.</p></body></html>"#;
        let result = html::parse(input);
        assert_eq!(result.content, "Find the secret code.");
    }

    #[test]
    fn test_links_in_document_order() {
        let input = r#"<body><a href="/a">A</a><a>no href</a><a href="https://x.org/b">B</a></body>"#;
        let result = html::parse(input);
        assert_eq!(result.links, vec!["/a", "https://x.org/b"]);
    }

    #[test]
    fn test_media_sources() {
        let input = r#"<body><audio src="clip.opus"></audio>
            <audio controls><source src="alt.mp3" type="audio/mpeg"></audio></body>"#;
        let result = html::parse(input);
        assert_eq!(result.media, vec!["clip.opus", "alt.mp3"]);
    }

    #[test]
    fn test_parse_with_parser_type() {
        let html_content =
            "<html><body><p>Hello, world!</p><a href=\"https://example.com\">Link</a></body></html>";
        let result = Parser::parse(html_content, ParserType::Html);
        assert_eq!(result.content, "Hello, world! Link");
        assert_eq!(result.links, vec!["https://example.com"]);
    }

    #[test]
    fn test_detect_parser_type() {
        assert_eq!(
            ParserType::detect(Some("text/html; charset=utf-8"), "https://q.example/x.md"),
            ParserType::Html
        );
        assert_eq!(
            ParserType::detect(Some("text/plain"), "https://q.example/quiz"),
            ParserType::Text
        );
        assert_eq!(
            ParserType::detect(None, "https://q.example/notes.md?raw=1"),
            ParserType::Text
        );
        assert_eq!(
            ParserType::detect(None, "https://q.example/quiz"),
            ParserType::Html
        );
    }
}
