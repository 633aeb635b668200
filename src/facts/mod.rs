//! Normalizes crawl output into the structured bundle handed to the oracle.

pub mod classify;
pub mod clean;
pub mod entities;
pub mod transcribe;

pub use classify::{TaskType, classify};
pub use clean::{TRUNCATION_MARKER, clean_text};
pub use transcribe::{NoTranscriber, Transcriber, WhisperTranscriber};

use crate::config::FactsConfig;
use crate::results::{Attachment, Page};
use entities::Entities;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Per-page record inside a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFacts {
    pub url: String,
    /// Cleaned visible text, with audio transcripts appended
    pub contents: String,
    /// Source URLs of the page's attachments
    pub attachments: Vec<String>,
}

/// Everything scraped for the current URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactBundle {
    pub pages: Vec<PageFacts>,
    pub attachments: Vec<Attachment>,
    pub found_numbers: BTreeSet<i64>,
    pub referenced_urls: BTreeSet<String>,
    pub detected_emails: BTreeSet<String>,
    pub student_identity: Option<String>,
    pub structured_resource_stats: Option<BTreeMap<String, Value>>,
    pub task_type: TaskType,
    pub evaluator_feedback: Option<String>,
    pub generation_attempt_context: BTreeMap<String, Value>,
}

/// Error text injected into the next generation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// Reason given with an incorrect verdict
    Evaluator(String),
    /// A failed run of the previous program
    Execution(String),
    /// The previous oracle reply broke the program contract
    Generation(String),
}

impl FactBundle {
    /// Copy of the bundle annotated for one generation attempt.
    ///
    /// The canonical bundle is left untouched so feedback for one attempt never
    /// shows up in the next URL's facts.
    pub fn for_attempt(
        &self,
        attempt: u32,
        max_attempts: u32,
        feedback: &[Feedback],
    ) -> FactBundle {
        let mut copy = self.clone();
        let context = &mut copy.generation_attempt_context;
        context.insert("attempt".to_string(), json!(attempt));
        context.insert("max_attempts".to_string(), json!(max_attempts));

        for item in feedback {
            match item {
                Feedback::Evaluator(reason) => {
                    copy.evaluator_feedback = Some(reason.clone());
                }
                Feedback::Execution(error) => {
                    context.insert("last_execution_error".to_string(), json!(error));
                }
                Feedback::Generation(error) => {
                    context.insert("last_generation_error".to_string(), json!(error));
                }
            }
        }
        copy
    }
}

/// Builds a [`FactBundle`] from crawled pages
pub struct FactBuilder {
    config: FactsConfig,
    transcriber: Arc<dyn Transcriber>,
}

impl FactBuilder {
    pub fn new(config: &FactsConfig, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self {
            config: config.clone(),
            transcriber: transcriber.unwrap_or_else(|| Arc::new(NoTranscriber)),
        }
    }

    pub async fn build(&self, pages: &[Page]) -> FactBundle {
        let mut page_facts = Vec::with_capacity(pages.len());
        let mut attachments: Vec<Attachment> = Vec::new();
        let mut entities = Entities::default();
        let mut stats = None;

        for page in pages {
            // Transcripts go after the cut so a long page never hides them
            let mut contents = clean_text(&page.visible_text, self.config.max_page_chars);
            for attachment in page.attachments.iter().filter(|a| a.is_audio()) {
                let Some(transcript) = self.transcriber.transcribe(attachment).await else {
                    continue;
                };
                let transcript = clean_text(&transcript, self.config.max_page_chars);
                if transcript.is_empty() {
                    continue;
                }
                if !contents.is_empty() {
                    contents.push(' ');
                }
                contents.push_str(&format!("Transcript of {}: {}", attachment.filename, transcript));
            }
            entities.scan(&contents);

            for attachment in &page.attachments {
                if !attachments.iter().any(|a| a.source_url == attachment.source_url) {
                    attachments.push(attachment.clone());
                }
            }

            if stats.is_none() {
                stats = page.tree_stats.as_ref().and_then(stats_map);
            }

            page_facts.push(PageFacts {
                url: page.url.clone(),
                contents,
                attachments: page.attachments.iter().map(|a| a.source_url.clone()).collect(),
            });
        }

        let mut classifier_input = page_facts
            .iter()
            .map(|p| p.contents.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        for attachment in &attachments {
            classifier_input.push_str(&format!(
                "\n{} {}",
                attachment.filename, attachment.content_type
            ));
        }
        let task_type = classify(&classifier_input);

        let student_identity = entities.identity(&self.config.identity_suffix);
        ::log::debug!(
            "Built facts: {} pages, {} attachments, task type {}",
            page_facts.len(),
            attachments.len(),
            task_type
        );

        FactBundle {
            pages: page_facts,
            attachments,
            found_numbers: entities.numbers,
            referenced_urls: entities.urls,
            detected_emails: entities.emails,
            student_identity,
            structured_resource_stats: stats,
            task_type,
            evaluator_feedback: None,
            generation_attempt_context: BTreeMap::new(),
        }
    }
}

fn stats_map(stats: &crate::results::TreeStats) -> Option<BTreeMap<String, Value>> {
    match serde_json::to_value(stats) {
        Ok(Value::Object(map)) => Some(map.into_iter().collect()),
        _ => None,
    }
}
