use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of task labels handed to the oracle as a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TreeListing,
    Csv,
    HttpRequest,
    Audio,
    Image,
    Pdf,
    Generic,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskType::TreeListing => "tree_listing",
            TaskType::Csv => "csv",
            TaskType::HttpRequest => "http_request",
            TaskType::Audio => "audio",
            TaskType::Image => "image",
            TaskType::Pdf => "pdf",
            TaskType::Generic => "generic",
        };
        f.write_str(label)
    }
}

const RULES: &[(TaskType, &[&str])] = &[
    (TaskType::TreeListing, &["git/trees", "tree listing for"]),
    (TaskType::Csv, &[".csv", "text/csv"]),
    (TaskType::HttpRequest, &["http get", "http post", "curl "]),
    (
        TaskType::Audio,
        &["audio/", ".opus", ".mp3", ".wav", ".m4a", "audio-passphrase", "transcript"],
    ),
    (TaskType::Image, &["image/", ".png", ".jpg", ".jpeg", "heatmap"]),
    (TaskType::Pdf, &[".pdf", "application/pdf"]),
];

/// Label for the concatenated page text. Total and side-effect free; the first
/// matching rule wins and anything unmatched is `Generic`.
pub fn classify(text: &str) -> TaskType {
    let text = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| text.contains(n)))
        .map(|(task, _)| *task)
        .unwrap_or(TaskType::Generic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules() {
        assert_eq!(classify("Use the GitHub API git/trees endpoint"), TaskType::TreeListing);
        assert_eq!(classify("Download messy.csv and sum"), TaskType::Csv);
        assert_eq!(classify("Run uv http get against the page"), TaskType::HttpRequest);
        assert_eq!(classify("listen to clip.opus"), TaskType::Audio);
        assert_eq!(classify("look at heatmap.png"), TaskType::Image);
        assert_eq!(classify("Read REPORT.PDF page 2"), TaskType::Pdf);
        assert_eq!(classify("What is 2 + 2?"), TaskType::Generic);
        assert_eq!(classify(""), TaskType::Generic);
    }

    #[test]
    fn test_earlier_rule_wins() {
        assert_eq!(classify("data.csv and clip.mp3"), TaskType::Csv);
    }

    #[test]
    fn test_display_matches_serde() {
        let json = serde_json::to_string(&TaskType::TreeListing).unwrap();
        assert_eq!(json, format!("\"{}\"", TaskType::TreeListing));
    }
}
