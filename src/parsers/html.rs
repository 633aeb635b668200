use crate::parsers::ParseResult;
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static MEDIA_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("audio[src], video[src], audio source[src], video source[src]")
        .expect("valid selector")
});

/// Elements whose text is never shown to a reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Parses HTML content to extract visible text, links and media sources
pub fn parse(html: &str) -> ParseResult {
    let doc = Html::parse_document(html);

    let text = visible_text(&doc);

    let links = doc
        .select(&LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .map(|s| s.to_string())
        .collect::<Vec<String>>();

    let media = doc
        .select(&MEDIA_SELECTOR)
        .filter_map(|e| e.value().attr("src"))
        .map(|s| s.to_string())
        .collect::<Vec<String>>();

    ::log::debug!(
        "HTML parser found {} links and {} media sources",
        links.len(),
        media.len()
    );

    ParseResult {
        content: text,
        links,
        media,
    }
}

/// Text of every node outside script-like elements, whitespace collapsed
fn visible_text(doc: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
