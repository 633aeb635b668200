use crate::config::LlmConfig;
use crate::results::Attachment;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Best-effort speech-to-text. `None` means no transcript, never an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, attachment: &Attachment) -> Option<String>;
}

/// Used when no transcription service is configured
pub struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _attachment: &Attachment) -> Option<String> {
        None
    }
}

/// OpenAI-compatible `/audio/transcriptions` client
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    pub fn new(client: reqwest::Client, api_base: String, config: &LlmConfig) -> Self {
        Self {
            client,
            api_base,
            api_key: config.api_key.clone(),
            model: config.transcribe_model.clone(),
        }
    }

    /// The configured transcriber, or the no-op one
    pub fn from_config(client: reqwest::Client, config: &LlmConfig) -> Box<dyn Transcriber> {
        match &config.transcribe_api_base {
            Some(base) => Box::new(Self::new(client, base.clone(), config)),
            None => Box::new(NoTranscriber),
        }
    }

    async fn request(&self, attachment: &Attachment) -> Result<String, String> {
        let bytes = tokio::fs::read(&attachment.local_path)
            .await
            .map_err(|e| e.to_string())?;
        let part = Part::bytes(bytes)
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| e.to_string())?;
        let form = Form::new().text("model", self.model.clone()).part("file", part);

        let url = format!("{}/audio/transcriptions", self.api_base.trim_end_matches('/'));
        let mut request = self
            .client
            .post(url)
            .multipart(form)
            .timeout(Duration::from_secs(120));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body: TranscriptionResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.text)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, attachment: &Attachment) -> Option<String> {
        match self.request(attachment).await {
            Ok(text) => {
                ::log::info!("Transcribed {} ({} chars)", attachment.filename, text.len());
                Some(text)
            }
            Err(e) => {
                ::log::warn!("Transcription of {} failed: {}", attachment.filename, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::test_support::{Fixture, FixtureServer};
    use serde_json::json;
    use std::path::PathBuf;

    fn audio(path: PathBuf) -> Attachment {
        Attachment {
            id: "0-clip.opus".into(),
            filename: "clip.opus".into(),
            content_type: "audio/ogg".into(),
            size_bytes: 4,
            source_url: "https://q.example/clip.opus".into(),
            local_path: path,
        }
    }

    #[tokio::test]
    async fn test_unconfigured_transcriber_yields_nothing() {
        let config = SolverConfig::default();
        let transcriber = WhisperTranscriber::from_config(reqwest::Client::new(), &config.llm);
        assert!(transcriber.transcribe(&audio("/nonexistent".into())).await.is_none());
    }

    #[tokio::test]
    async fn test_transcribes_through_api() {
        let server = FixtureServer::start(vec![(
            "/v1/audio/transcriptions",
            Fixture::json(json!({"text": "the passphrase is amber"})),
        )])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.opus");
        std::fs::write(&path, b"OggS").unwrap();

        let mut config = SolverConfig::default();
        config.llm.transcribe_api_base = Some(server.url("/v1"));
        let transcriber = WhisperTranscriber::from_config(reqwest::Client::new(), &config.llm);

        let text = transcriber.transcribe(&audio(path)).await;
        assert_eq!(text.as_deref(), Some("the passphrase is amber"));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let server = FixtureServer::start(vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.opus");
        std::fs::write(&path, b"OggS").unwrap();

        let mut config = SolverConfig::default();
        config.llm.transcribe_api_base = Some(server.url("/v1"));
        let transcriber = WhisperTranscriber::from_config(reqwest::Client::new(), &config.llm);

        assert!(transcriber.transcribe(&audio(path)).await.is_none());
    }
}
