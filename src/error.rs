//! Error types for the solver.
//!
//! Each external boundary gets its own error enum; `JobError` is what a
//! terminated job reports and maps directly onto the failure taxonomy the
//! orchestrator reasons about.

use thiserror::Error;

/// Errors raised while fetching a single URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} exceeds the {limit} byte cap")]
    TooLarge { url: String, limit: u64 },

    #[error("{0} already failed earlier in this job")]
    PreviouslyFailed(String),

    #[error("render failed for {url}: {reason}")]
    Render { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scraping failures. Fatal for the job.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("seed page {url} could not be fetched: {source}")]
    Seed {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("seed {0} resolved to an attachment, not a page")]
    SeedIsAttachment(String),

    #[error("cancelled")]
    Cancelled,
}

/// Failures to obtain a structurally valid program from the oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("oracle unreachable: {0}")]
    Unreachable(String),

    #[error("oracle output is missing the #PYTHON_START/#PYTHON_END markers")]
    MissingMarkers,

    #[error("generated program never assigns final_answer")]
    MissingResultBinding,

    #[error("generated program uses disallowed construct '{0}'")]
    DisallowedConstruct(String),
}

/// Evaluator submission failures. Never retried.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("evaluator request failed: {0}")]
    Transport(String),

    #[error("evaluator protocol violation: {0}")]
    Protocol(String),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why a job stopped without reaching a natural end.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("scrape failure: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("generation failure after {attempts} attempts: {last}")]
    Generation {
        attempts: u32,
        last: GenerationError,
    },

    #[error("execution failure: {0}")]
    Execution(String),

    #[error("evaluator protocol violation: {0}")]
    EvaluatorProtocol(String),

    #[error("evaluator unavailable: {0}")]
    EvaluatorTransport(String),

    #[error("job cancelled")]
    Cancelled,
}

impl From<SubmitError> for JobError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Transport(msg) => JobError::EvaluatorTransport(msg),
            SubmitError::Protocol(msg) => JobError::EvaluatorProtocol(msg),
        }
    }
}
