use crate::crawlers::attachments::AttachmentStore;
use crate::crawlers::tree;
use crate::crawlers::web::{Fetched, PageFetcher};
use crate::error::{FetchError, ScrapeError};
use crate::filter::UrlFilter;
use crate::results::Page;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// An entry waiting to be fetched
#[derive(Debug)]
struct Frontier {
    url: Url,
    depth: usize,
    /// Index of the page that linked here; `None` for the seed
    parent: Option<usize>,
}

/// Bounded-depth, depth-first crawler.
///
/// Traversal is iterative over an explicit stack; a URL enters the visited set
/// when it is popped and is never fetched again within the crawl.
pub struct Crawler {
    fetcher: PageFetcher,
    filter: Arc<UrlFilter>,
    client: reqwest::Client,
    tree_api_base: String,
    tree_timeout: Duration,
}

impl Crawler {
    pub fn new(
        fetcher: PageFetcher,
        filter: Arc<UrlFilter>,
        client: reqwest::Client,
        tree_api_base: impl Into<String>,
        tree_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            filter,
            client,
            tree_api_base: tree_api_base.into(),
            tree_timeout,
        }
    }

    /// Crawl from `seed_url`, following links at most `max_depth` hops away.
    ///
    /// Only a failure to fetch the seed is an error; any other URL that fails
    /// simply contributes nothing.
    pub async fn crawl(
        &self,
        seed_url: &str,
        max_depth: usize,
        store: &mut AttachmentStore,
        cancel: &CancellationToken,
    ) -> Result<Vec<Page>, ScrapeError> {
        ::log::info!("Starting crawl for: {} (max depth {})", seed_url, max_depth);

        let seed = Url::parse(seed_url).map_err(|_| ScrapeError::Seed {
            url: seed_url.to_string(),
            source: FetchError::InvalidUrl(seed_url.to_string()),
        })?;
        let seed = self.filter.normalize_url(&seed);

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_specs: HashSet<String> = HashSet::new();
        let mut pages: Vec<Page> = Vec::new();
        let mut stack = vec![Frontier {
            url: seed,
            depth: 0,
            parent: None,
        }];

        while let Some(entry) = stack.pop() {
            if !visited.insert(entry.url.to_string()) {
                ::log::trace!("Skipping already visited: {}", entry.url);
                continue;
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                fetched = self.fetcher.fetch(&entry.url, store) => fetched,
            };

            let page = match (fetched, entry.parent) {
                (Ok(Fetched::Page(page)), _) => page,
                (Ok(Fetched::Attachment(attachment)), Some(parent)) => {
                    pages[parent].add_attachment(attachment);
                    continue;
                }
                (Ok(Fetched::Attachment(_)), None) => {
                    return Err(ScrapeError::SeedIsAttachment(entry.url.to_string()));
                }
                (Err(source), None) => {
                    return Err(ScrapeError::Seed {
                        url: entry.url.to_string(),
                        source,
                    });
                }
                (Err(e), Some(_)) => {
                    ::log::warn!("Skipping {}: {}", entry.url, e);
                    continue;
                }
            };

            let index = pages.len();
            let children = self
                .collect_links(page, entry.depth, max_depth, &visited, store, cancel, &mut pages)
                .await?;

            self.expand_tree_spec(index, &mut seen_specs, &mut pages, cancel)
                .await?;

            // Reverse so the first link in document order is fetched first
            for url in children.into_iter().rev() {
                stack.push(Frontier {
                    url,
                    depth: entry.depth + 1,
                    parent: Some(index),
                });
            }
        }

        ::log::info!("Crawl of {} produced {} pages", seed_url, pages.len());
        Ok(pages)
    }

    /// Download the page's attachment links, push the page, and return the
    /// links that should be traversed next
    #[allow(clippy::too_many_arguments)]
    async fn collect_links(
        &self,
        mut page: Page,
        depth: usize,
        max_depth: usize,
        visited: &HashSet<String>,
        store: &mut AttachmentStore,
        cancel: &CancellationToken,
        pages: &mut Vec<Page>,
    ) -> Result<Vec<Url>, ScrapeError> {
        let mut children = Vec::new();
        let links = std::mem::take(&mut page.outbound_links);

        for link in &links {
            let Ok(url) = Url::parse(link) else {
                continue;
            };

            if self.filter.is_attachment_url(&url) {
                let downloaded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                    downloaded = store.download(&url) => downloaded,
                };
                match downloaded {
                    Ok(attachment) => page.add_attachment(attachment),
                    Err(e) => ::log::warn!("Attachment {} unavailable: {}", url, e),
                }
                continue;
            }

            if depth >= max_depth {
                continue;
            }
            if !self.filter.should_crawl(&url) {
                ::log::debug!("URL filter rejected: {}", url);
                continue;
            }
            if visited.contains(url.as_str()) {
                continue;
            }
            children.push(url);
        }

        page.outbound_links = links;
        pages.push(page);
        Ok(children)
    }

    /// Append a synthetic listing page when the page at `index` embeds a tree spec
    async fn expand_tree_spec(
        &self,
        index: usize,
        seen_specs: &mut HashSet<String>,
        pages: &mut Vec<Page>,
        cancel: &CancellationToken,
    ) -> Result<(), ScrapeError> {
        let spec = tree::detect(&pages[index].visible_text)
            .or_else(|| tree::detect(&pages[index].rendered_html));
        let Some(spec) = spec else {
            return Ok(());
        };
        if !seen_specs.insert(spec.key()) {
            return Ok(());
        }

        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            listing = tree::fetch_listing_page(&self.client, &self.tree_api_base, &spec, self.tree_timeout) => listing,
        };
        match listing {
            Ok(page) => pages.push(page),
            Err(e) => ::log::warn!("Tree listing for {} unavailable: {}", spec.key(), e),
        }
        Ok(())
    }
}
