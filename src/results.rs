use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A downloaded resource persisted in the job's attachment cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Name of the cached file, unique within the job
    pub id: String,

    /// Original filename taken from the source URL
    pub filename: String,

    /// Content type without parameters
    pub content_type: String,

    pub size_bytes: u64,

    pub source_url: String,

    /// Where the bytes live on disk
    pub local_path: PathBuf,
}

impl Attachment {
    pub fn is_audio(&self) -> bool {
        self.content_type.starts_with("audio/")
    }
}

/// Counts computed from a git tree listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeStats {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    pub path_prefix: Option<String>,
    pub extension: Option<String>,
    pub total_entries: usize,
    pub blob_count: usize,
    pub matching_count: usize,
}

/// Represents a fetched page with its content, links and attachments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// URL of the page
    pub url: String,

    /// HTML as served (or as rendered by the browser fallback)
    pub rendered_html: String,

    /// Visible text content
    pub visible_text: String,

    /// Absolute links discovered on the page, in document order
    pub outbound_links: Vec<String>,

    /// Attachments referenced by the page
    pub attachments: Vec<Attachment>,

    /// Present only on the synthetic page produced from a tree listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_stats: Option<TreeStats>,
}

impl Page {
    /// Create a new page without attachments
    pub fn new(
        url: String,
        rendered_html: String,
        visible_text: String,
        outbound_links: Vec<String>,
    ) -> Self {
        Self {
            url,
            rendered_html,
            visible_text,
            outbound_links,
            attachments: Vec::new(),
            tree_stats: None,
        }
    }

    /// Create the synthetic page describing a tree listing
    pub fn from_tree_stats(listing_url: String, stats: TreeStats) -> Self {
        let summary = format!(
            "Tree listing for {}/{} at {}: {} entries, {} files, {} matching (prefix {:?}, extension {:?})",
            stats.owner,
            stats.repo,
            stats.sha,
            stats.total_entries,
            stats.blob_count,
            stats.matching_count,
            stats.path_prefix.as_deref().unwrap_or(""),
            stats.extension.as_deref().unwrap_or(""),
        );
        Self {
            url: listing_url,
            rendered_html: String::new(),
            visible_text: summary,
            outbound_links: Vec::new(),
            attachments: Vec::new(),
            tree_stats: Some(stats),
        }
    }

    /// Attach a resource unless one with the same source URL is already present
    pub fn add_attachment(&mut self, attachment: Attachment) {
        if !self
            .attachments
            .iter()
            .any(|a| a.source_url == attachment.source_url)
        {
            self.attachments.push(attachment);
        }
    }
}
