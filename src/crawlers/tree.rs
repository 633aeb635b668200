//! Detection of an embedded git-tree specification and computation of its
//! match counts, so downstream consumers receive the numbers precomputed.

use crate::error::FetchError;
use crate::results::{Page, TreeStats};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"));

/// Owner/repository, revision, and optional filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSpec {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    pub path_prefix: Option<String>,
    pub extension: Option<String>,
}

#[derive(Deserialize)]
struct RawSpec {
    owner: Option<String>,
    repo: Option<String>,
    repository: Option<String>,
    #[serde(alias = "ref", alias = "revision")]
    sha: Option<String>,
    #[serde(alias = "pathPrefix", alias = "path")]
    path_prefix: Option<String>,
    #[serde(alias = "ext")]
    extension: Option<String>,
}

impl RawSpec {
    fn into_spec(self) -> Option<TreeSpec> {
        let (owner, repo) = match (self.owner, self.repo, self.repository) {
            (Some(owner), Some(repo), _) => (owner, repo),
            (None, None, Some(full)) => {
                let (owner, repo) = full.split_once('/')?;
                (owner.to_string(), repo.to_string())
            }
            _ => return None,
        };
        let sha = self.sha?;
        if owner.is_empty() || repo.is_empty() || sha.is_empty() {
            return None;
        }

        let extension = self.extension.filter(|e| !e.is_empty()).map(|e| {
            if e.starts_with('.') {
                e
            } else {
                format!(".{e}")
            }
        });

        Some(TreeSpec {
            owner,
            repo,
            sha,
            path_prefix: self.path_prefix.filter(|p| !p.is_empty()),
            extension,
        })
    }
}

impl TreeSpec {
    /// Key used to fetch each distinct spec only once per crawl
    pub fn key(&self) -> String {
        format!(
            "{}/{}@{}:{}:{}",
            self.owner,
            self.repo,
            self.sha,
            self.path_prefix.as_deref().unwrap_or(""),
            self.extension.as_deref().unwrap_or("")
        )
    }

    pub fn listing_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.sha
        )
    }

    fn matches(&self, path: &str) -> bool {
        let prefix_ok = self
            .path_prefix
            .as_deref()
            .is_none_or(|prefix| path.starts_with(prefix));
        let ext_ok = self
            .extension
            .as_deref()
            .is_none_or(|ext| path.ends_with(ext));
        prefix_ok && ext_ok
    }
}

/// First JSON object in `text` that describes a tree spec
pub fn detect(text: &str) -> Option<TreeSpec> {
    OBJECT_RE
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<RawSpec>(m.as_str()).ok())
        .find_map(RawSpec::into_spec)
}

/// Count entries of a tree listing response
pub fn compute_stats(spec: &TreeSpec, listing: &Value) -> TreeStats {
    let entries = listing
        .get("tree")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let blobs: Vec<&str> = entries
        .iter()
        .filter(|e| e.get("type").and_then(Value::as_str) == Some("blob"))
        .filter_map(|e| e.get("path").and_then(Value::as_str))
        .collect();

    TreeStats {
        owner: spec.owner.clone(),
        repo: spec.repo.clone(),
        sha: spec.sha.clone(),
        path_prefix: spec.path_prefix.clone(),
        extension: spec.extension.clone(),
        total_entries: entries.len(),
        blob_count: blobs.len(),
        matching_count: blobs.iter().filter(|p| spec.matches(p)).count(),
    }
}

/// Fetch the listing for `spec` and turn it into a synthetic page
pub async fn fetch_listing_page(
    client: &reqwest::Client,
    api_base: &str,
    spec: &TreeSpec,
    timeout: Duration,
) -> Result<Page, FetchError> {
    let url = spec.listing_url(api_base);
    ::log::info!("Fetching tree listing {}", url);

    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url,
            status: response.status().as_u16(),
        });
    }

    let listing: Value = response.json().await.map_err(|source| FetchError::Http {
        url: url.clone(),
        source,
    })?;

    let stats = compute_stats(spec, &listing);
    ::log::debug!(
        "Tree {}: {} matching of {} files",
        spec.key(),
        stats.matching_count,
        stats.blob_count
    );
    Ok(Page::from_tree_stats(url, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_spec_in_page_text() {
        let text = r#"Count the files. Params: {"owner": "octo", "repo": "demo", "sha": "abc123", "pathPrefix": "docs/", "extension": "md"} then submit."#;
        let spec = detect(text).unwrap();
        assert_eq!(spec.owner, "octo");
        assert_eq!(spec.repo, "demo");
        assert_eq!(spec.sha, "abc123");
        assert_eq!(spec.path_prefix.as_deref(), Some("docs/"));
        assert_eq!(spec.extension.as_deref(), Some(".md"));
    }

    #[test]
    fn test_detect_repository_form() {
        let spec = detect(r#"{"repository": "octo/demo", "ref": "main"}"#).unwrap();
        assert_eq!(spec.owner, "octo");
        assert_eq!(spec.sha, "main");
        assert!(spec.path_prefix.is_none());
    }

    #[test]
    fn test_detect_requires_revision() {
        assert!(detect(r#"{"owner": "octo", "repo": "demo"}"#).is_none());
        assert!(detect(r#"{"answer": 12}"#).is_none());
        assert!(detect("no json here").is_none());
    }

    #[test]
    fn test_compute_stats() {
        let spec = detect(r#"{"owner":"o","repo":"r","sha":"s","pathPrefix":"src/","extension":".rs"}"#)
            .unwrap();
        let listing = json!({
            "tree": [
                {"path": "src", "type": "tree"},
                {"path": "src/main.rs", "type": "blob"},
                {"path": "src/lib.rs", "type": "blob"},
                {"path": "src/notes.md", "type": "blob"},
                {"path": "build.rs", "type": "blob"}
            ]
        });
        let stats = compute_stats(&spec, &listing);
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.blob_count, 4);
        assert_eq!(stats.matching_count, 2);
    }

    #[test]
    fn test_listing_url() {
        let spec = detect(r#"{"owner":"o","repo":"r","sha":"s"}"#).unwrap();
        assert_eq!(
            spec.listing_url("https://api.github.com/"),
            "https://api.github.com/repos/o/r/git/trees/s?recursive=1"
        );
    }
}
