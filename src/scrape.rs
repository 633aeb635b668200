//! Crawl plus fact building: everything the solver knows about one URL.

use crate::config::SolverConfig;
use crate::crawlers::{AttachmentStore, Crawler, PageFetcher, Renderer, WebDriverRenderer};
use crate::error::{ConfigError, ScrapeError};
use crate::facts::{FactBuilder, FactBundle, Transcriber, WhisperTranscriber};
use crate::filter::{UrlFilter, UrlFilterConfig};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Scrape: Send + Sync {
    /// Crawl `url` and build its facts. Attachments are stored under
    /// `workspace`, which belongs to this call alone.
    async fn scrape(
        &self,
        url: &str,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<FactBundle, ScrapeError>;
}

pub struct WebScraper {
    crawler: Crawler,
    facts: FactBuilder,
    client: reqwest::Client,
    config: Arc<SolverConfig>,
}

impl WebScraper {
    pub fn from_config(
        config: Arc<SolverConfig>,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let filter = Arc::new(UrlFilter::new(UrlFilterConfig {
            allow_external: config.crawl.allow_external,
            required_domain: None,
            exclude_patterns: config.crawl.exclude_patterns.clone(),
        })?);

        let renderer: Option<Arc<dyn Renderer>> = if config.fetch.render_enabled {
            Some(Arc::new(WebDriverRenderer::new(&config.fetch)))
        } else {
            None
        };
        let fetcher = PageFetcher::new(client.clone(), Arc::clone(&filter), renderer, &config.fetch);
        let crawler = Crawler::new(
            fetcher,
            filter,
            client.clone(),
            config.crawl.tree_api_base.clone(),
            Duration::from_secs(config.fetch.timeout_secs),
        );

        let transcriber: Arc<dyn Transcriber> =
            Arc::from(WhisperTranscriber::from_config(client.clone(), &config.llm));
        let facts = FactBuilder::new(&config.facts, Some(transcriber));

        Ok(Self {
            crawler,
            facts,
            client,
            config,
        })
    }
}

#[async_trait]
impl Scrape for WebScraper {
    async fn scrape(
        &self,
        url: &str,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<FactBundle, ScrapeError> {
        let mut store =
            AttachmentStore::new(workspace, self.client.clone(), &self.config.attachments);
        let pages = self
            .crawler
            .crawl(url, self.config.crawl.max_depth, &mut store, cancel)
            .await?;
        ::log::info!(
            "Crawled {}: {} pages, {} attachments",
            url,
            pages.len(),
            store.len()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
            bundle = self.facts.build(&pages) => Ok(bundle),
        }
    }
}
