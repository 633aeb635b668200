//! Lossy regex extraction of emails, integers and absolute URLs.

use crate::parsers::text::extract_urls;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
});
static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("valid regex"));

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Entities {
    pub emails: BTreeSet<String>,
    pub numbers: BTreeSet<i64>,
    pub urls: BTreeSet<String>,
}

impl Entities {
    /// Accumulate matches from `text`
    pub fn scan(&mut self, text: &str) {
        for m in EMAIL_RE.find_iter(text) {
            self.emails.insert(m.as_str().to_string());
        }
        // Values that overflow i64 are dropped
        for m in INTEGER_RE.find_iter(text) {
            if let Ok(n) = m.as_str().parse::<i64>() {
                self.numbers.insert(n);
            }
        }
        self.urls.extend(extract_urls(text));
    }

    /// First email ending with `suffix`, compared case-insensitively
    pub fn identity(&self, suffix: &str) -> Option<String> {
        let suffix = suffix.to_ascii_lowercase();
        self.emails
            .iter()
            .find(|e| e.to_ascii_lowercase().ends_with(&suffix))
            .cloned()
    }
}
