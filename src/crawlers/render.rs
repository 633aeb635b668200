use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::timeout;

/// Capability that turns a URL into HTML after scripts have run
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, FetchError>;
}

/// Renders pages through a WebDriver server (e.g. ChromeDriver).
///
/// A fresh session is opened per render so concurrent jobs never share one.
pub struct WebDriverRenderer {
    webdriver_url: String,
    timeout: Duration,
}

impl WebDriverRenderer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let client = connect_to_webdriver(&self.webdriver_url)
            .await
            .ok_or_else(|| FetchError::Render {
                url: url.to_string(),
                reason: "no WebDriver server reachable".to_string(),
            })?;

        let result = timeout(self.timeout, navigate_and_read(&client, url)).await;

        if let Err(e) = client.close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }

        match result {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(FetchError::Render {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                ::log::error!("Timeout rendering: {}", url);
                Err(FetchError::Render {
                    url: url.to_string(),
                    reason: format!("timed out after {:?}", self.timeout),
                })
            }
        }
    }
}

async fn navigate_and_read(client: &Client, url: &str) -> Result<String, fantoccini::error::CmdError> {
    client.goto(url).await?;
    // Give late scripts a moment to fill the DOM
    tokio::time::sleep(Duration::from_millis(300)).await;
    client.source().await
}

/// Connects to the WebDriver instance, trying common local ports after the configured one
async fn connect_to_webdriver(webdriver_url: &str) -> Option<Client> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Some(client);
        }
        Err(e) => {
            ::log::error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
        }
    }

    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4444", // Selenium / geckodriver default
        "http://127.0.0.1:4444", // Try with IP instead of localhost
    ];

    for url in fallback_urls.iter() {
        if *url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Some(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    None
}
