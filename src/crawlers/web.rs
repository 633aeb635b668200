use crate::config::FetchConfig;
use crate::crawlers::attachments::AttachmentStore;
use crate::crawlers::render::Renderer;
use crate::error::FetchError;
use crate::filter::UrlFilter;
use crate::parsers::Parser;
use crate::results::{Attachment, Page};
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// What a single URL turned out to be
#[derive(Debug)]
pub enum Fetched {
    Page(Page),
    Attachment(Attachment),
}

/// Fetches one URL, statically when possible and through the renderer when the
/// page looks script-dependent
pub struct PageFetcher {
    client: reqwest::Client,
    filter: Arc<UrlFilter>,
    renderer: Option<Arc<dyn Renderer>>,
    timeout: Duration,
    min_static_len: usize,
}

/// Result of the static attempt
struct StaticBody {
    html: String,
    content_type: Option<String>,
}

impl PageFetcher {
    pub fn new(
        client: reqwest::Client,
        filter: Arc<UrlFilter>,
        renderer: Option<Arc<dyn Renderer>>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            client,
            filter,
            renderer,
            timeout: Duration::from_secs(config.timeout_secs),
            min_static_len: config.min_static_len,
        }
    }

    /// Fetch `url`, storing it in `store` when it is an attachment
    pub async fn fetch(
        &self,
        url: &Url,
        store: &mut AttachmentStore,
    ) -> Result<Fetched, FetchError> {
        if self.filter.is_attachment_url(url) {
            ::log::debug!("Attachment by extension: {}", url);
            return store.download(url).await.map(Fetched::Attachment);
        }

        let static_result = match self.fetch_static(url, store).await {
            Ok(StaticOutcome::Attachment(a)) => return Ok(Fetched::Attachment(a)),
            Ok(StaticOutcome::Body(body)) => Ok(body),
            Err(e) => {
                ::log::warn!("Static fetch failed for {}: {}", url, e);
                Err(e)
            }
        };

        let needs_render = match &static_result {
            Ok(body) => self.needs_render(&body.html),
            Err(_) => true,
        };

        let (html, content_type) = match (static_result, needs_render) {
            (Ok(body), false) => (body.html, body.content_type),
            (Err(e), false) => return Err(e),
            (static_result, true) => match self.render(url).await {
                Some(html) => (html, Some("text/html".to_string())),
                None => match static_result {
                    Ok(body) => (body.html, body.content_type),
                    Err(e) => return Err(e),
                },
            },
        };

        Ok(Fetched::Page(self.build_page(url, html, content_type.as_deref())))
    }

    /// JS-dependence heuristic
    fn needs_render(&self, html: &str) -> bool {
        if html.trim().len() < self.min_static_len {
            return true;
        }
        html.to_ascii_lowercase().contains("<script") && html.contains("innerHTML")
    }

    async fn render(&self, url: &Url) -> Option<String> {
        let renderer = self.renderer.as_ref()?;
        ::log::info!("Static content insufficient, rendering {}", url);
        match renderer.render(url.as_str()).await {
            Ok(html) => Some(html),
            Err(e) => {
                ::log::error!("Render fallback failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch_static(
        &self,
        url: &Url,
        store: &mut AttachmentStore,
    ) -> Result<StaticOutcome, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        if content_type
            .as_deref()
            .is_some_and(UrlFilter::is_attachment_content_type)
        {
            ::log::debug!("Attachment by content type: {}", url);
            return store
                .persist(url, response)
                .await
                .map(StaticOutcome::Attachment);
        }

        let html = response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(StaticOutcome::Body(StaticBody { html, content_type }))
    }

    fn build_page(&self, url: &Url, html: String, content_type: Option<&str>) -> Page {
        let parsed = Parser::parse_response(&html, content_type, url.as_str());

        let mut links: Vec<String> = Vec::new();
        for raw in parsed.links.iter().chain(parsed.media.iter()) {
            let Some(resolved) = self.filter.resolve(url, raw) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let resolved = resolved.to_string();
            if !links.contains(&resolved) {
                links.push(resolved);
            }
        }

        ::log::info!("Found {} links in {}", links.len(), url);
        Page::new(url.to_string(), html, parsed.content, links)
    }
}

enum StaticOutcome {
    Body(StaticBody),
    Attachment(Attachment),
}
