use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Configuration for the crawl phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum link depth below the seed page
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Whether to follow links to other domains
    #[serde(default = "default_allow_external")]
    pub allow_external: bool,

    /// Regex patterns for URLs to exclude from traversal
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Base URL of the git tree listing API
    #[serde(default = "default_tree_api_base")]
    pub tree_api_base: String,
}

/// Configuration for fetching a single URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a static fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Pages with less trimmed HTML than this are re-fetched through the renderer
    #[serde(default = "default_min_static_len")]
    pub min_static_len: usize,

    /// Whether the rendering fallback is enabled at all
    #[serde(default = "default_render_enabled")]
    pub render_enabled: bool,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Timeout for a rendered fetch, in seconds
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

/// Configuration for the attachment cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Hard cap on a single download, in bytes
    #[serde(default = "default_max_attachment_bytes")]
    pub max_bytes: u64,

    /// Timeout for a download, in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub timeout_secs: u64,
}

/// Configuration for running generated programs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter used to run the program file
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Name of the program file inside the working directory
    #[serde(default = "default_program_file")]
    pub program_file: String,

    /// Wall-clock timeout, in seconds
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,

    /// Bytes of stdout/stderr kept in memory
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,

    /// Attempts for transient launch failures
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,
}

/// Configuration for the code-generation oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// API key, usually provided through LLM_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Substrings a generated program must not contain
    #[serde(default = "default_disallowed_patterns")]
    pub disallowed_patterns: Vec<String>,

    /// Base URL of an OpenAI-compatible transcription API (disabled when unset)
    #[serde(default)]
    pub transcribe_api_base: Option<String>,

    #[serde(default = "default_transcribe_model")]
    pub transcribe_model: String,
}

/// Configuration for the remote evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Submission endpoint
    #[serde(default = "default_evaluator_url")]
    pub submit_url: String,

    /// Identity sent with every submission
    #[serde(default)]
    pub email: String,

    /// Shared secret sent with every submission and checked by the trigger
    #[serde(default, skip_serializing)]
    pub secret: String,

    #[serde(default = "default_evaluator_timeout_secs")]
    pub timeout_secs: u64,
}

/// Retry ceilings and the policy choices of the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_generation_attempts")]
    pub max_generation_attempts: u32,

    #[serde(default = "default_execution_attempts")]
    pub max_execution_attempts: u32,

    #[serde(default = "default_evaluator_attempts")]
    pub max_evaluator_attempts: u32,

    /// Advance to the evaluator's next URL even when every attempt was wrong
    #[serde(default = "default_true")]
    pub advance_on_exhausted_miss: bool,

    /// Submit an absent answer when execution retries are exhausted
    #[serde(default = "default_true")]
    pub submit_on_execution_failure: bool,

    /// Stop when the evaluator hands back a URL this job already processed
    #[serde(default = "default_true")]
    pub detect_url_cycles: bool,

    /// Hard ceiling on URLs processed by one job
    #[serde(default = "default_max_urls_per_job")]
    pub max_urls_per_job: usize,
}

/// Configuration for fact extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsConfig {
    /// Characters of cleaned text kept per page
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,

    /// Address suffix identifying the student's institutional email
    #[serde(default = "default_identity_suffix")]
    pub identity_suffix: String,
}

/// Configuration for the HTTP trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Top-level solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Directory holding attachments, sandbox runs and the audit log
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_section")]
    pub crawl: CrawlConfig,
    #[serde(default = "default_section")]
    pub fetch: FetchConfig,
    #[serde(default = "default_section")]
    pub attachments: AttachmentConfig,
    #[serde(default = "default_section")]
    pub sandbox: SandboxConfig,
    #[serde(default = "default_section")]
    pub llm: LlmConfig,
    #[serde(default = "default_section")]
    pub evaluator: EvaluatorConfig,
    #[serde(default = "default_section")]
    pub retry: RetryPolicy,
    #[serde(default = "default_section")]
    pub facts: FactsConfig,
    #[serde(default = "default_section")]
    pub trigger: TriggerConfig,
}

/// Every section deserializes from an empty object thanks to its field defaults
fn default_section<T: serde::de::DeserializeOwned>() -> T {
    serde_json::from_str("{}").expect("config sections default every field")
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    1
}

fn default_allow_external() -> bool {
    true
}

fn default_exclude_patterns() -> Vec<String> {
    vec![r"\.(css|js|ico|woff|woff2|ttf|eot|svg)(\?.*)?$".to_string()]
}

fn default_tree_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_min_static_len() -> usize {
    200
}

fn default_render_enabled() -> bool {
    true
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_render_timeout_secs() -> u64 {
    45
}

fn default_max_attachment_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_download_timeout_secs() -> u64 {
    15
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_program_file() -> String {
    "solution.py".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    25
}

fn default_output_limit_bytes() -> usize {
    1024 * 1024
}

fn default_launch_attempts() -> u32 {
    3
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_disallowed_patterns() -> Vec<String> {
    [
        "read_html",
        "html5lib",
        "lxml",
        "camelot",
        "tabula",
        "fitz",
        "PyMuPDF",
        "subprocess",
        "os.system",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_transcribe_model() -> String {
    "whisper-1".to_string()
}

fn default_evaluator_url() -> String {
    "https://tds-llm-analysis.s-anand.net/submit".to_string()
}

fn default_evaluator_timeout_secs() -> u64 {
    20
}

fn default_generation_attempts() -> u32 {
    3
}

fn default_execution_attempts() -> u32 {
    3
}

fn default_evaluator_attempts() -> u32 {
    2
}

fn default_max_urls_per_job() -> usize {
    50
}

fn default_max_page_chars() -> usize {
    3000
}

fn default_identity_suffix() -> String {
    "@ds.study.iitm.ac.in".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("quiz-chain")
}

macro_rules! section_defaults {
    ($($section:ty),* $(,)?) => {
        $(
            impl Default for $section {
                fn default() -> Self {
                    default_section()
                }
            }
        )*
    };
}

section_defaults!(
    SolverConfig,
    CrawlConfig,
    FetchConfig,
    AttachmentConfig,
    SandboxConfig,
    LlmConfig,
    EvaluatorConfig,
    RetryPolicy,
    FactsConfig,
    TriggerConfig,
);

impl SolverConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Override secrets and endpoints from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Override secrets and endpoints using `lookup` as the variable source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(email) = lookup("SOLVER_EMAIL") {
            self.evaluator.email = email;
        }
        if let Some(secret) = lookup("SOLVER_SECRET") {
            self.evaluator.secret = secret;
        }
        if let Some(url) = lookup("EVALUATOR_URL") {
            self.evaluator.submit_url = url;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(base) = lookup("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base) = lookup("TRANSCRIBE_API_BASE") {
            self.llm.transcribe_api_base = Some(base);
        }
        if let Some(url) = lookup("WEBDRIVER_URL") {
            self.fetch.webdriver_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SolverConfig::from_json("{}").unwrap();
        assert_eq!(config.crawl.max_depth, 1);
        assert_eq!(config.retry.max_generation_attempts, 3);
        assert_eq!(config.retry.max_execution_attempts, 3);
        assert_eq!(config.retry.max_evaluator_attempts, 2);
        assert!(config.retry.advance_on_exhausted_miss);
        assert_eq!(config.attachments.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.facts.max_page_chars, 3000);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config =
            SolverConfig::from_json(r#"{"sandbox": {"timeout_secs": 5}, "crawl": {"max_depth": 3}}"#)
                .unwrap();
        assert_eq!(config.sandbox.timeout_secs, 5);
        assert_eq!(config.sandbox.interpreter, "python3");
        assert_eq!(config.crawl.max_depth, 3);
        assert!(config.crawl.allow_external);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SOLVER_SECRET", "s3cret"),
            ("SOLVER_EMAIL", "me@example.com"),
            ("LLM_API_KEY", "key"),
        ]
        .into_iter()
        .collect();

        let mut config = SolverConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.evaluator.secret, "s3cret");
        assert_eq!(config.evaluator.email, "me@example.com");
        assert_eq!(config.llm.api_key.as_deref(), Some("key"));
        assert_eq!(config.fetch.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = SolverConfig::default();
        config.evaluator.secret = "hidden".to_string();
        config.llm.api_key = Some("hidden-key".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hidden"));
    }
}
