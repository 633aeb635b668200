//! The per-job retry state machine.
//!
//! For each URL: scrape once, then up to `max_evaluator_attempts` rounds of
//! generate → execute → submit. Generation is bounded by
//! `max_generation_attempts`, and each generated program is run at most
//! `max_execution_attempts` times. No counter is replenished within a URL.

use crate::audit::AuditRecord;
use crate::codegen::{CodeGenClient, GeneratedProgram};
use crate::config::RetryPolicy;
use crate::context::JobContext;
use crate::error::{GenerationError, JobError, ScrapeError};
use crate::evaluator::{Evaluate, Verdict};
use crate::facts::{FactBundle, Feedback};
use crate::sandbox::{Execute, ExecutionErrorKind, ExecutionResult};
use crate::scrape::Scrape;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// How a job ended
#[derive(Debug)]
pub enum Termination {
    /// The evaluator accepted an answer and offered no next URL
    Completed,
    /// Every evaluator attempt for `url` was wrong and there was nowhere to go
    Exhausted { url: String },
    /// The evaluator pointed back at a URL this job already processed
    CycleDetected { url: String },
    /// `max_urls_per_job` URLs were processed
    UrlLimitReached,
    Failed(JobError),
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: Uuid,
    /// URLs processed, in order
    pub visited: Vec<String>,
    /// Incorrect verdicts whose audit record could not be written
    pub unlogged_misses: u32,
    pub termination: Termination,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Exhausted { url } => write!(f, "attempts exhausted at {url}"),
            Termination::CycleDetected { url } => write!(f, "cycle detected at {url}"),
            Termination::UrlLimitReached => write!(f, "URL limit reached"),
            Termination::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.termination, Termination::Completed)
    }
}

/// What to do after a verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Complete,
    Retry,
    Advance(String),
    Exhausted,
}

/// The decision matrix over (next URL, correct, attempts left)
pub fn decide(verdict: &Verdict, attempt: u32, policy: &RetryPolicy) -> Decision {
    let attempts_left = attempt < policy.max_evaluator_attempts;
    match (&verdict.next_url, verdict.correct) {
        (None, true) => Decision::Complete,
        (Some(next), true) => Decision::Advance(next.clone()),
        (_, false) if attempts_left => Decision::Retry,
        (None, false) => Decision::Exhausted,
        (Some(next), false) if policy.advance_on_exhausted_miss => Decision::Advance(next.clone()),
        (Some(_), false) => Decision::Exhausted,
    }
}

/// Mutable state of the URL being worked on
#[derive(Debug)]
struct JobState {
    current_url: String,
    eval_attempt: u32,
    evaluator_feedback: Option<Feedback>,
}

impl JobState {
    fn new(url: String) -> Self {
        Self {
            current_url: url,
            eval_attempt: 0,
            evaluator_feedback: None,
        }
    }
}

pub struct Orchestrator {
    scraper: Arc<dyn Scrape>,
    codegen: CodeGenClient,
    executor: Arc<dyn Execute>,
    evaluator: Arc<dyn Evaluate>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        scraper: Arc<dyn Scrape>,
        codegen: CodeGenClient,
        executor: Arc<dyn Execute>,
        evaluator: Arc<dyn Evaluate>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            scraper,
            codegen,
            executor,
            evaluator,
            policy,
        }
    }

    /// Run one job from `seed_url` until it terminates
    pub async fn run(&self, job: &JobContext, seed_url: &str) -> JobOutcome {
        ::log::info!("[{}] Job started at {}", job.id, seed_url);
        let mut progress = Progress::default();
        let termination = self.drive(job, seed_url.to_string(), &mut progress).await;
        remove_workspace(job, &job.attachment_dir).await;

        match &termination {
            Termination::Completed => {
                ::log::info!("[{}] Job completed after {} URLs", job.id, progress.visited.len())
            }
            Termination::Failed(e) => ::log::error!("[{}] Job failed: {}", job.id, e),
            other => ::log::warn!("[{}] Job stopped: {:?}", job.id, other),
        }
        if progress.unlogged_misses > 0 {
            ::log::error!(
                "[{}] {} incorrect verdicts are missing from the audit log",
                job.id,
                progress.unlogged_misses
            );
        }

        JobOutcome {
            job_id: job.id,
            visited: progress.visited,
            unlogged_misses: progress.unlogged_misses,
            termination,
        }
    }

    async fn drive(&self, job: &JobContext, seed_url: String, progress: &mut Progress) -> Termination {
        let mut state = JobState::new(seed_url);

        loop {
            if progress.visited.len() >= self.policy.max_urls_per_job {
                ::log::warn!(
                    "[{}] URL limit of {} reached before {}",
                    job.id,
                    self.policy.max_urls_per_job,
                    state.current_url
                );
                return Termination::UrlLimitReached;
            }
            progress.visited.push(state.current_url.clone());

            let workspace = job
                .attachment_dir
                .join(format!("{:03}", progress.visited.len()));
            let step = self.process_url(job, &mut state, &workspace, progress).await;
            // Attachments are only needed while this URL is being answered
            remove_workspace(job, &workspace).await;
            let next_url = match step {
                Ok(next_url) => next_url,
                Err(termination) => return termination,
            };

            if self.policy.detect_url_cycles && progress.visited.contains(&next_url) {
                ::log::warn!("[{}] Evaluator sent us back to {}", job.id, next_url);
                return Termination::CycleDetected { url: next_url };
            }
            ::log::info!("[{}] Advancing to {}", job.id, next_url);
            state = JobState::new(next_url);
        }
    }

    /// Scrape the current URL and run its evaluator rounds. `Ok` carries the
    /// URL to advance to.
    async fn process_url(
        &self,
        job: &JobContext,
        state: &mut JobState,
        workspace: &Path,
        progress: &mut Progress,
    ) -> Result<String, Termination> {
        let url = state.current_url.clone();

        ::log::info!("[{}] Scraping {}", job.id, url);
        let scraped = cancellable(job, self.scraper.scrape(&url, workspace, &job.cancel)).await;
        let facts = match scraped {
            Err(Interrupted) | Ok(Err(ScrapeError::Cancelled)) => {
                return Err(Termination::Failed(JobError::Cancelled));
            }
            Ok(Err(e)) => return Err(Termination::Failed(JobError::Scrape(e))),
            Ok(Ok(facts)) => facts,
        };

        loop {
            state.eval_attempt += 1;
            ::log::info!(
                "[{}] {} evaluator attempt {}/{}",
                job.id,
                url,
                state.eval_attempt,
                self.policy.max_evaluator_attempts
            );

            let answer = self
                .produce_answer(job, &facts, state)
                .await
                .map_err(Termination::Failed)?;

            let verdict = match cancellable(job, self.evaluator.submit(&url, answer.as_ref())).await {
                Err(_) => return Err(Termination::Failed(JobError::Cancelled)),
                Ok(Err(e)) => return Err(Termination::Failed(e.into())),
                Ok(Ok(verdict)) => verdict,
            };

            if !verdict.correct
                && !self
                    .record_miss(job, &url, answer.as_ref(), &verdict, state.eval_attempt)
                    .await
            {
                progress.unlogged_misses += 1;
            }

            match decide(&verdict, state.eval_attempt, &self.policy) {
                Decision::Complete => return Err(Termination::Completed),
                Decision::Exhausted => return Err(Termination::Exhausted { url }),
                Decision::Advance(next) => {
                    if !verdict.correct {
                        ::log::warn!("[{}] Accepting the miss on {} and moving on", job.id, url);
                    }
                    return Ok(next);
                }
                Decision::Retry => {
                    let reason = verdict
                        .reason
                        .clone()
                        .unwrap_or_else(|| "the submitted answer was incorrect".to_string());
                    ::log::info!("[{}] Incorrect answer for {}: {}", job.id, url, reason);
                    state.evaluator_feedback = Some(Feedback::Evaluator(reason));
                }
            }
        }
    }

    /// Generating and Executing for one evaluator attempt.
    ///
    /// `Ok(None)` is the absent answer submitted after execution retries ran out.
    async fn produce_answer(
        &self,
        job: &JobContext,
        facts: &FactBundle,
        state: &JobState,
    ) -> Result<Option<Value>, JobError> {
        let max_attempts = self.policy.max_generation_attempts.max(1);
        let mut latest: Option<Feedback> = None;
        let mut last_generation_error: Option<GenerationError> = None;
        let mut last_execution_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let feedback: Vec<Feedback> = state
                .evaluator_feedback
                .iter()
                .chain(latest.iter())
                .cloned()
                .collect();
            let attempt_facts = facts.for_attempt(attempt, max_attempts, &feedback);

            let program = match cancellable(job, self.codegen.program(&attempt_facts, &state.current_url)).await
            {
                Err(_) => return Err(JobError::Cancelled),
                Ok(Err(e)) => {
                    ::log::warn!(
                        "[{}] Generation attempt {}/{} failed: {}",
                        job.id,
                        attempt,
                        max_attempts,
                        e
                    );
                    latest = Some(Feedback::Generation(e.to_string()));
                    last_generation_error = Some(e);
                    continue;
                }
                Ok(Ok(program)) => program,
            };

            match self.execute(job, &program).await? {
                Ok(answer) => {
                    ::log::info!("[{}] Program produced answer {}", job.id, answer);
                    return Ok(Some(answer));
                }
                Err(message) => {
                    ::log::warn!(
                        "[{}] Program from attempt {}/{} failed: {}",
                        job.id,
                        attempt,
                        max_attempts,
                        message
                    );
                    latest = Some(Feedback::Execution(message.clone()));
                    last_execution_error = Some(message);
                }
            }
        }

        match (last_execution_error, last_generation_error) {
            (Some(message), _) if self.policy.submit_on_execution_failure => {
                ::log::warn!("[{}] No answer produced, submitting none: {}", job.id, message);
                Ok(None)
            }
            (Some(message), _) => Err(JobError::Execution(message)),
            (None, last) => Err(JobError::Generation {
                attempts: max_attempts,
                last: last.unwrap_or_else(|| {
                    GenerationError::Unreachable("no generation attempt was made".to_string())
                }),
            }),
        }
    }

    /// Run one program. A timeout re-runs the same program; any other failure
    /// goes back to generation.
    async fn execute(
        &self,
        job: &JobContext,
        program: &GeneratedProgram,
    ) -> Result<Result<Value, String>, JobError> {
        let max_runs = self.policy.max_execution_attempts.max(1);
        let mut last = String::new();

        for run in 1..=max_runs {
            let result = cancellable(job, self.executor.execute(program))
                .await
                .map_err(|_| JobError::Cancelled)?;
            match result {
                ExecutionResult::Ok { answer } => return Ok(Ok(answer)),
                ExecutionResult::Error {
                    kind: ExecutionErrorKind::Timeout,
                    message,
                } => {
                    ::log::warn!("[{}] Run {}/{} timed out", job.id, run, max_runs);
                    last = format!("{}: {}", ExecutionErrorKind::Timeout, message);
                }
                ExecutionResult::Error { kind, message } => {
                    return Ok(Err(format!("{kind}: {message}")));
                }
            }
        }

        Ok(Err(last))
    }

    async fn record_miss(
        &self,
        job: &JobContext,
        url: &str,
        answer: Option<&Value>,
        verdict: &Verdict,
        attempt: u32,
    ) -> bool {
        let record = AuditRecord::new(
            url,
            answer.cloned().unwrap_or(Value::Null),
            verdict.reason.clone(),
            attempt,
        );
        match job.audit().append(&record).await {
            Ok(()) => true,
            Err(e) => {
                ::log::error!("[{}] Failed to write audit record: {}", job.id, e);
                false
            }
        }
    }
}

/// What a job has accumulated so far
#[derive(Default)]
struct Progress {
    visited: Vec<String>,
    unlogged_misses: u32,
}

async fn remove_workspace(job: &JobContext, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => ::log::warn!("[{}] Could not remove {}: {}", job.id, dir.display(), e),
    }
}

/// Cancelled error marker
struct Interrupted;

async fn cancellable<F: Future>(job: &JobContext, fut: F) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = job.cancel.cancelled() => Err(Interrupted),
        out = fut => Ok(out),
    }
}
