use crate::facts::FactBundle;

const INSTRUCTIONS: &str = r#"You are an expert at solving multi-page automated quiz questions.

You are given structured facts with:
- pages: url, cleaned visible text ("contents") and attachment source URLs
- attachments: downloaded files with local_path, size_bytes and content_type
- found_numbers, referenced_urls, detected_emails, student_identity
- structured_resource_stats: precomputed counts for a git tree listing, when present
- task_type: a hint about the kind of task
- evaluator_feedback / generation_attempt_context: why earlier attempts failed

Your job:
1. Read all pages and inspect all attachments first.
2. Load attachments from their local_path only. Never download them again.
3. Work out what the question is asking.
4. Write raw Python code that assigns the answer to `final_answer`.

Rules:
- Wrap the code between a line `#PYTHON_START` and a line `#PYTHON_END`.
- Do not print anything and do not output JSON or markdown.
- final_answer must be a plain scalar (int, float, str or bool).
- Do not assume CSV column names; inspect the file with pandas first.
- The variables `facts` (a dict of the facts below) and `current_url` are predefined.
- If no question can be inferred, set final_answer = "ok"."#;

/// Prompt for one generation attempt
pub fn build_prompt(facts: &FactBundle, current_url: &str, disallowed: &[String]) -> String {
    let facts_json =
        serde_json::to_string_pretty(facts).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = String::from(INSTRUCTIONS);
    if !disallowed.is_empty() {
        prompt.push_str(&format!(
            "\n- Never use any of: {}.",
            disallowed.join(", ")
        ));
    }
    prompt.push_str(&format!("\n\nTask type hint: {}\n", facts.task_type));

    if let Some(feedback) = &facts.evaluator_feedback {
        prompt.push_str(&format!(
            "\nA previous answer for this page was rejected: {feedback}\n"
        ));
    }
    for key in ["last_execution_error", "last_generation_error"] {
        if let Some(error) = facts.generation_attempt_context.get(key).and_then(|v| v.as_str()) {
            prompt.push_str(&format!("\nThe previous program failed: {error}\n"));
        }
    }

    prompt.push_str(&format!("\nFacts:\n{facts_json}\n\nCurrent URL: {current_url}\n"));
    prompt
}

/// Wrap a checked body in the harness that embeds the facts and prints the
/// result as the last stdout line
pub fn wrap_in_harness(body: &str, facts: &FactBundle, current_url: &str) -> String {
    let facts_json = serde_json::to_string(facts).unwrap_or_else(|_| "{}".to_string());
    // A JSON string literal is also a valid Python string literal
    let facts_literal =
        serde_json::to_string(&facts_json).unwrap_or_else(|_| "\"{}\"".to_string());
    let url_literal = serde_json::to_string(current_url).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"import io
import json
import sys

_real_stdout = sys.stdout
sys.stdout = io.StringIO()

facts = json.loads({facts_literal})
current_url = {url_literal}

{body}

sys.stdout = _real_stdout

try:
    final_answer
except NameError:
    raise RuntimeError("final_answer was never assigned")

if hasattr(final_answer, "item") and callable(final_answer.item):
    final_answer = final_answer.item()

print(json.dumps({{"answer": final_answer}}))
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactsConfig;
    use crate::facts::{FactBuilder, Feedback};
    use crate::results::Page;

    async fn facts() -> FactBundle {
        let page = Page::new(
            "https://q.example/q1".into(),
            String::new(),
            "What is \"6 x 7\"?".into(),
            Vec::new(),
        );
        FactBuilder::new(&FactsConfig::default(), None).build(&[page]).await
    }

    #[tokio::test]
    async fn test_prompt_carries_feedback_and_facts() {
        let bundle = facts().await;
        let copy = bundle.for_attempt(2, 3, &[Feedback::Evaluator("Off by one".into())]);
        let prompt = build_prompt(&copy, "https://q.example/q1", &["subprocess".to_string()]);

        assert!(prompt.contains("#PYTHON_START"));
        assert!(prompt.contains("rejected: Off by one"));
        assert!(prompt.contains("Never use any of: subprocess"));
        assert!(prompt.contains("Task type hint: generic"));
        assert!(prompt.contains("Current URL: https://q.example/q1"));
        assert!(prompt.contains("\"attempt\": 2"));
    }

    #[tokio::test]
    async fn test_execution_error_is_reported() {
        let bundle = facts().await;
        let copy = bundle.for_attempt(2, 3, &[Feedback::Execution("KeyError: 'value'".into())]);
        let prompt = build_prompt(&copy, "https://q.example/q1", &[]);
        assert!(prompt.contains("The previous program failed: KeyError: 'value'"));
        assert!(!prompt.contains("rejected"));
    }

    #[tokio::test]
    async fn test_harness_embeds_body_and_facts() {
        let bundle = facts().await;
        let source = wrap_in_harness("final_answer = 42", &bundle, "https://q.example/q1");

        assert!(source.contains("\nfinal_answer = 42\n"));
        assert!(source.contains("current_url = \"https://q.example/q1\""));
        assert!(source.contains("facts = json.loads(\""));
        assert!(source.trim_end().ends_with(r#"print(json.dumps({"answer": final_answer}))"#));
    }
}
