//! Process-wide and per-job context passed explicitly to every component.

use crate::audit::AuditLog;
use crate::config::SolverConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Built once per process and shared by all jobs
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Arc<SolverConfig>,
    pub audit: Arc<AuditLog>,
    pub shutdown: CancellationToken,
}

impl RunContext {
    pub fn new(config: SolverConfig) -> Self {
        let audit = AuditLog::new(config.output_dir.join("failures.jsonl"));
        Self {
            config: Arc::new(config),
            audit: Arc::new(audit),
            shutdown: CancellationToken::new(),
        }
    }

    /// Parent of the per-run sandbox working directories
    pub fn sandbox_dir(&self) -> PathBuf {
        self.config.output_dir.join("sandbox")
    }

    /// Derive the context for a new job. Cancelling the process cancels the job.
    pub fn job(&self) -> JobContext {
        let id = Uuid::new_v4();
        JobContext {
            id,
            attachment_dir: self
                .config
                .output_dir
                .join("attachments")
                .join(id.to_string()),
            cancel: self.shutdown.child_token(),
            run: self.clone(),
        }
    }
}

/// Everything one job owns: its identity, disk namespaces and cancellation
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: Uuid,
    /// Attachment namespace, unique to this job
    pub attachment_dir: PathBuf,
    pub cancel: CancellationToken,
    pub run: RunContext,
}

impl JobContext {
    pub fn config(&self) -> &SolverConfig {
        &self.run.config
    }

    pub fn audit(&self) -> &AuditLog {
        &self.run.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_get_distinct_namespaces() {
        let run = RunContext::new(SolverConfig::default());
        let a = run.job();
        let b = run.job();
        assert_ne!(a.id, b.id);
        assert_ne!(a.attachment_dir, b.attachment_dir);
        assert!(a.attachment_dir.ends_with(a.id.to_string()));
    }

    #[test]
    fn test_shutdown_cancels_jobs() {
        let run = RunContext::new(SolverConfig::default());
        let job = run.job();
        assert!(!job.cancel.is_cancelled());
        run.shutdown.cancel();
        assert!(job.cancel.is_cancelled());
    }
}
