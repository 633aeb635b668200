//! Program generation through an external oracle.

pub mod client;
pub mod contract;
pub mod prompt;

pub use client::ChatClient;
pub use contract::extract_program;

use crate::error::GenerationError;
use crate::facts::FactBundle;
use async_trait::async_trait;
use std::sync::Arc;

/// The code-generation oracle: prompt in, raw text out
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// A program that passed the structural checks, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    /// Body as produced by the oracle
    pub body: String,
    /// Body wrapped in the harness
    pub source: String,
}

/// Turns facts into checked, runnable programs
pub struct CodeGenClient {
    oracle: Arc<dyn CodeGenerator>,
    disallowed: Vec<String>,
}

impl CodeGenClient {
    pub fn new(oracle: Arc<dyn CodeGenerator>, disallowed: Vec<String>) -> Self {
        Self { oracle, disallowed }
    }

    /// One oracle round trip. `facts` is the per-attempt copy.
    pub async fn program(
        &self,
        facts: &FactBundle,
        current_url: &str,
    ) -> Result<GeneratedProgram, GenerationError> {
        let prompt = prompt::build_prompt(facts, current_url, &self.disallowed);
        let raw = self.oracle.generate(&prompt).await?;
        let body = extract_program(&raw, &self.disallowed)?;
        let source = prompt::wrap_in_harness(&body, facts, current_url);
        Ok(GeneratedProgram { body, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactsConfig;
    use crate::facts::FactBuilder;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<String, GenerationError>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CodeGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_program_round_trip() {
        let oracle = Arc::new(Recording {
            reply: Ok("#PYTHON_START\nfinal_answer = 7\n#PYTHON_END".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let client = CodeGenClient::new(oracle.clone(), vec!["subprocess".into()]);
        let facts = FactBuilder::new(&FactsConfig::default(), None).build(&[]).await;

        let program = client.program(&facts, "https://q.example/").await.unwrap();
        assert_eq!(program.body, "final_answer = 7");
        assert!(program.source.contains("final_answer = 7"));
        assert_eq!(oracle.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contract_violation_surfaces() {
        let oracle = Arc::new(Recording {
            reply: Ok("#PYTHON_START\nimport subprocess\nfinal_answer = 7\n#PYTHON_END".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let client = CodeGenClient::new(oracle, vec!["subprocess".into()]);
        let facts = FactBuilder::new(&FactsConfig::default(), None).build(&[]).await;

        let err = client.program(&facts, "https://q.example/").await.unwrap_err();
        assert_eq!(err, GenerationError::DisallowedConstruct("subprocess".into()));
    }
}
