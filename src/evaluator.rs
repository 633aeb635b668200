//! Submission of answers to the remote evaluator.

use crate::config::EvaluatorConfig;
use crate::error::SubmitError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// The evaluator's response to one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub correct: bool,
    pub next_url: Option<String>,
    pub reason: Option<String>,
}

#[async_trait]
pub trait Evaluate: Send + Sync {
    /// Submit `answer` (absent when no program produced one) for `url`
    async fn submit(&self, url: &str, answer: Option<&Value>) -> Result<Verdict, SubmitError>;
}

#[derive(Debug, Serialize)]
struct Submission<'a> {
    email: &'a str,
    secret: &'a str,
    url: &'a str,
    answer: Option<&'a Value>,
}

pub struct EvaluatorClient {
    http_client: reqwest::Client,
    config: EvaluatorConfig,
}

impl EvaluatorClient {
    pub fn new(http_client: reqwest::Client, config: &EvaluatorConfig) -> Self {
        Self {
            http_client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Evaluate for EvaluatorClient {
    async fn submit(&self, url: &str, answer: Option<&Value>) -> Result<Verdict, SubmitError> {
        let submission = Submission {
            email: &self.config.email,
            secret: &self.config.secret,
            url,
            answer,
        };

        let response = self
            .http_client
            .post(&self.config.submit_url)
            .json(&submission)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        // Rejections may come back with a 4xx status and a verdict body
        let parsed = serde_json::from_str::<Value>(&body)
            .map_err(|_| SubmitError::Protocol(format!("response is not JSON: {}", snippet(&body))))
            .and_then(|value| parse_verdict(&value));

        match parsed {
            Ok(verdict) => Ok(verdict),
            Err(_) if !status.is_success() => Err(SubmitError::Transport(format!(
                "HTTP {}: {}",
                status,
                snippet(&body)
            ))),
            Err(e) => Err(e),
        }
    }
}

/// Strict reading of a verdict: `correct` must be a bool and one of `url` /
/// `next_url` must be present as a string or null
pub fn parse_verdict(value: &Value) -> Result<Verdict, SubmitError> {
    let object = value
        .as_object()
        .ok_or_else(|| SubmitError::Protocol("verdict is not a JSON object".to_string()))?;

    let correct = match object.get("correct") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(SubmitError::Protocol(format!(
                "\"correct\" is not a boolean: {other}"
            )));
        }
        None => return Err(SubmitError::Protocol("missing \"correct\"".to_string())),
    };

    let next_url = match ["url", "next_url"].iter().find_map(|k| object.get(*k)) {
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) => None,
        Some(other) => {
            return Err(SubmitError::Protocol(format!(
                "next URL is not a string: {other}"
            )));
        }
        None => return Err(SubmitError::Protocol("missing next URL field".to_string())),
    };

    let reason = object
        .get("reason")
        .and_then(|r| r.as_str())
        .map(str::to_string);

    Ok(Verdict {
        correct,
        next_url,
        reason,
    })
}

fn snippet(body: &str) -> &str {
    crate::utils::truncate_chars(body, 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, FixtureServer};
    use serde_json::json;

    fn client(server: &FixtureServer) -> EvaluatorClient {
        let mut config = EvaluatorConfig::default();
        config.submit_url = server.url("/submit");
        config.email = "23f2000@ds.study.iitm.ac.in".into();
        config.secret = "s3cret".into();
        EvaluatorClient::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn test_parse_verdict_shapes() {
        let v = parse_verdict(&json!({"correct": true, "url": null})).unwrap();
        assert_eq!(
            v,
            Verdict {
                correct: true,
                next_url: None,
                reason: None
            }
        );

        let v = parse_verdict(&json!({"correct": false, "next_url": "https://q.example/2", "reason": "Wrong sum"}))
            .unwrap();
        assert_eq!(v.next_url.as_deref(), Some("https://q.example/2"));
        assert_eq!(v.reason.as_deref(), Some("Wrong sum"));

        let v = parse_verdict(&json!({"correct": true, "url": ""})).unwrap();
        assert!(v.next_url.is_none());
    }

    #[test]
    fn test_parse_verdict_violations() {
        for bad in [
            json!({"url": null}),
            json!({"correct": "yes", "url": null}),
            json!({"correct": true}),
            json!({"correct": true, "url": 5}),
            json!([true, null]),
        ] {
            assert!(
                matches!(parse_verdict(&bad), Err(SubmitError::Protocol(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_submit_posts_payload() {
        let server = FixtureServer::start(vec![(
            "/submit",
            Fixture::json(json!({"correct": true, "url": "https://q.example/2", "reason": null})),
        )])
        .await;

        let answer = json!(42);
        let verdict = client(&server)
            .submit("https://q.example/1", Some(&answer))
            .await
            .unwrap();
        assert!(verdict.correct);
        assert_eq!(verdict.next_url.as_deref(), Some("https://q.example/2"));

        let bodies = server.json_bodies("/submit");
        assert_eq!(
            bodies[0],
            json!({
                "email": "23f2000@ds.study.iitm.ac.in",
                "secret": "s3cret",
                "url": "https://q.example/1",
                "answer": 42
            })
        );
    }

    #[tokio::test]
    async fn test_absent_answer_is_null() {
        let server = FixtureServer::start(vec![(
            "/submit",
            Fixture::json(json!({"correct": false, "url": null, "reason": "No answer"})),
        )])
        .await;

        let verdict = client(&server).submit("https://q.example/1", None).await.unwrap();
        assert!(!verdict.correct);
        assert_eq!(server.json_bodies("/submit")[0]["answer"], Value::Null);
    }

    #[tokio::test]
    async fn test_rejection_with_error_status_is_still_a_verdict() {
        let server = FixtureServer::start(vec![(
            "/submit",
            Fixture::json(json!({"correct": false, "url": null, "reason": "Wrong"})).with_status(400),
        )])
        .await;

        let verdict = client(&server).submit("https://q.example/1", None).await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("Wrong"));
    }

    #[tokio::test]
    async fn test_malformed_success_is_protocol_violation() {
        let server = FixtureServer::start(vec![(
            "/submit",
            Fixture::json(json!({"status": "received"})),
        )])
        .await;

        let err = client(&server).submit("https://q.example/1", None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let server = FixtureServer::start(vec![(
            "/submit",
            Fixture::new("text/plain", "upstream down").with_status(502),
        )])
        .await;

        let err = client(&server).submit("https://q.example/1", None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Transport(msg) if msg.contains("502")));
    }
}
