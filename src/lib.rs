pub mod audit;
pub mod codegen;
pub mod config;
pub mod context;
pub mod crawlers;
pub mod error;
pub mod evaluator;
pub mod facts;
pub mod filter;
pub mod orchestrator;
pub mod parsers;
pub mod results;
pub mod sandbox;
pub mod scrape;
pub mod trigger;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::SolverConfig;
pub use context::{JobContext, RunContext};
pub use error::{ConfigError, JobError};
pub use orchestrator::{JobOutcome, Orchestrator, Termination};

use codegen::{ChatClient, CodeGenClient};
use evaluator::EvaluatorClient;
use sandbox::SandboxExecutor;
use scrape::WebScraper;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Builder that assembles a [`Runner`] from configuration
pub struct Solver {
    config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Load configuration from a JSON file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(SolverConfig::from_file(path)?))
    }

    /// Apply secrets and endpoints from the environment
    pub fn with_env(mut self) -> Self {
        self.config.apply_env();
        self
    }

    /// Override the crawl depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.crawl.max_depth = max_depth;
        self
    }

    /// Override where attachments, sandbox runs and the audit log are written
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Wire the HTTP-backed components together
    pub fn start(self) -> Result<Runner, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quiz-chain/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let run = RunContext::new(self.config);
        let config = Arc::clone(&run.config);

        if config.evaluator.email.is_empty() || config.evaluator.secret.is_empty() {
            ::log::warn!("Evaluator email or secret is not set; submissions will likely be rejected");
        }
        if config.llm.api_key.is_none() {
            ::log::warn!("No LLM API key configured");
        }

        let scraper = WebScraper::from_config(Arc::clone(&config), client.clone())?;
        let oracle = ChatClient::new(client.clone(), &config.llm);
        ::log::info!("Using model {} at {}", oracle.model(), config.llm.api_base);
        let codegen = CodeGenClient::new(Arc::new(oracle), config.llm.disallowed_patterns.clone());
        let executor = SandboxExecutor::new(run.sandbox_dir(), &config.sandbox);
        let evaluator = EvaluatorClient::new(client, &config.evaluator);

        let orchestrator = Orchestrator::new(
            Arc::new(scraper),
            codegen,
            Arc::new(executor),
            Arc::new(evaluator),
            config.retry.clone(),
        );
        Ok(Runner::from_parts(run, orchestrator))
    }
}

/// Runs jobs against a shared [`RunContext`]
pub struct Runner {
    run: RunContext,
    orchestrator: Arc<Orchestrator>,
}

impl Runner {
    pub fn from_parts(run: RunContext, orchestrator: Orchestrator) -> Self {
        Self {
            run,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.run
    }

    /// Run one job to completion
    pub async fn run_job(&self, seed_url: &str) -> JobOutcome {
        let job = self.run.job();
        self.orchestrator.run(&job, seed_url).await
    }

    /// Start a job in the background and return its identifier immediately
    pub fn spawn_job(&self, seed_url: String) -> Uuid {
        let job = self.run.job();
        let id = job.id;
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.run(&job, &seed_url).await;
        });
        id
    }

    /// Cancel every running job
    pub fn shutdown(&self) {
        self.run.shutdown.cancel();
    }
}
