use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// File suffixes that mark a link as an attachment rather than a page
pub const ATTACHMENT_EXTENSIONS: &[&str] = &[
    "csv", "pdf", "txt", "json", "opus", "wav", "mp3", "ogg", "m4a", "png", "jpg", "jpeg", "gif",
    "zip", "xlsx",
];

/// Content-type prefixes that mark a response as an attachment
const ATTACHMENT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/octet-stream",
    "application/zip",
    "application/json",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument",
    "text/csv",
    "audio/",
    "image/",
    "video/",
];

/// Configuration for URL filtering in crawlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    /// Whether to allow crawling external domains/sites
    #[serde(default = "default_allow_external")]
    pub allow_external: bool,

    /// Domain restriction for crawling (only consulted when allow_external is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_domain: Option<String>,

    /// Regex patterns for URLs to exclude
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_allow_external() -> bool {
    true
}

impl Default for UrlFilterConfig {
    fn default() -> Self {
        Self {
            allow_external: true,
            required_domain: None,
            exclude_patterns: vec![
                // Web assets never carry quiz content
                r"\.(css|js|ico|woff|woff2|ttf|eot|svg)(\?.*)?$".to_string(),
            ],
        }
    }
}

/// Decides which discovered URLs are followed, and which are attachments
#[derive(Debug)]
pub struct UrlFilter {
    config: UrlFilterConfig,
    exclude_regexes: Vec<Regex>,
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(UrlFilterConfig::default()).expect("Default regex patterns should be valid")
    }
}

impl UrlFilter {
    /// Create a new URL filter from configuration
    pub fn new(config: UrlFilterConfig) -> Result<Self, regex::Error> {
        let mut exclude_regexes = Vec::with_capacity(config.exclude_patterns.len());
        for pattern in &config.exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            config,
            exclude_regexes,
        })
    }

    /// Determine if a URL should be fetched at all
    pub fn should_crawl(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        if !self.is_in_domain_scope(url) {
            return false;
        }

        let url_str = url.as_str();
        !self.exclude_regexes.iter().any(|re| re.is_match(url_str))
    }

    /// Whether the URL's path ends in a known attachment suffix
    pub fn is_attachment_url(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        match path.rsplit_once('.') {
            Some((_, ext)) => ATTACHMENT_EXTENSIONS.contains(&ext),
            None => false,
        }
    }

    /// Whether a response content type belongs to a binary/document family
    pub fn is_attachment_content_type(content_type: &str) -> bool {
        let ct = content_type.trim().to_ascii_lowercase();
        ATTACHMENT_CONTENT_TYPES
            .iter()
            .any(|prefix| ct.starts_with(prefix))
    }

    fn is_in_domain_scope(&self, url: &Url) -> bool {
        if self.config.allow_external {
            return true;
        }

        match (&self.config.required_domain, url.domain()) {
            (Some(required), Some(domain)) => domain == required,
            _ => false,
        }
    }

    /// Create a normalized version of the URL (e.g., removing fragments)
    pub fn normalize_url(&self, url: &Url) -> Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized
    }

    /// Resolve `link` against `base`, returning the normalized absolute URL
    pub fn resolve(&self, base: &Url, link: &str) -> Option<Url> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        base.join(link).ok().map(|u| self.normalize_url(&u))
    }
}
