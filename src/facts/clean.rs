use crate::utils::truncate_chars;
use regex::Regex;
use std::sync::LazyLock;

/// Appended to text cut at the page limit
pub const TRUNCATION_MARKER: &str = " ...[truncated]...";

// 50 or more numeric tokens in a row: a tabular dump, not prose
static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\d+\s*){50,}").expect("valid regex"));

/// Strip digit dumps, collapse whitespace, and cap the length at `max_chars`
/// characters (plus the marker)
pub fn clean_text(text: &str, max_chars: usize) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let without_dumps = DIGIT_RUN_RE.replace_all(text, " ");
    let collapsed = without_dumps.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > max_chars {
        let mut truncated = truncate_chars(&collapsed, max_chars).to_string();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        collapsed
    }
}
