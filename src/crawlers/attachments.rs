use crate::config::AttachmentConfig;
use crate::error::FetchError;
use crate::results::Attachment;
use crate::utils::{filename_from_url, sanitize_filename};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

const OCTET_STREAM: &str = "application/octet-stream";

/// Per-job cache of downloaded resources, keyed by source URL.
///
/// Bytes go straight to disk as they arrive; only metadata is kept in memory.
#[derive(Debug)]
pub struct AttachmentStore {
    dir: PathBuf,
    client: reqwest::Client,
    max_bytes: u64,
    timeout: Duration,
    cache: HashMap<String, Attachment>,
    failed: HashSet<String>,
    next_seq: usize,
}

impl AttachmentStore {
    /// Create a store writing into `dir`, which should be unique to the job
    pub fn new(dir: impl Into<PathBuf>, client: reqwest::Client, config: &AttachmentConfig) -> Self {
        Self {
            dir: dir.into(),
            client,
            max_bytes: config.max_bytes,
            timeout: Duration::from_secs(config.timeout_secs),
            cache: HashMap::new(),
            failed: HashSet::new(),
            next_seq: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Previously downloaded attachment for `url`, if any
    pub fn get(&self, url: &str) -> Option<&Attachment> {
        self.cache.get(url)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Download `url` unless it is already cached
    pub async fn download(&mut self, url: &Url) -> Result<Attachment, FetchError> {
        if let Some(hit) = self.cache.get(url.as_str()) {
            ::log::trace!("Attachment cache hit: {}", url);
            return Ok(hit.clone());
        }
        if self.failed.contains(url.as_str()) {
            return Err(FetchError::PreviouslyFailed(url.to_string()));
        }

        ::log::debug!("Downloading attachment: {}", url);
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            });

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                self.failed.insert(url.to_string());
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: r.status().as_u16(),
                });
            }
            Err(e) => {
                self.failed.insert(url.to_string());
                return Err(e);
            }
        };

        self.persist(url, response).await
    }

    /// Stream an already-open response to disk and cache it under `url`
    pub async fn persist(
        &mut self,
        url: &Url,
        mut response: reqwest::Response,
    ) -> Result<Attachment, FetchError> {
        if let Some(hit) = self.cache.get(url.as_str()) {
            return Ok(hit.clone());
        }

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_len.is_some_and(|len| len > self.max_bytes) {
            self.failed.insert(url.to_string());
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(strip_params);

        let filename = filename_from_url(url);
        let id = format!("{}-{}", self.next_seq, sanitize_filename(&filename));
        let local_path = self.dir.join(&id);

        let (total, head) = match self.stream_to_disk(url, &mut response, &local_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&local_path).await;
                self.failed.insert(url.to_string());
                return Err(e);
            }
        };

        let content_type = resolve_content_type(header_type.as_deref(), &filename, &head);
        self.next_seq += 1;

        let attachment = Attachment {
            id,
            filename,
            content_type,
            size_bytes: total,
            source_url: url.to_string(),
            local_path,
        };
        ::log::info!(
            "Stored attachment {} ({}, {} bytes)",
            attachment.source_url,
            attachment.content_type,
            attachment.size_bytes
        );
        self.cache.insert(url.to_string(), attachment.clone());
        Ok(attachment)
    }

    /// Write the body to `path`, returning its size and first bytes. The
    /// caller removes the file on error.
    async fn stream_to_disk(
        &self,
        url: &Url,
        response: &mut reqwest::Response,
        path: &Path,
    ) -> Result<(u64, Vec<u8>), FetchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = File::create(path).await?;

        let mut total: u64 = 0;
        let mut head: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })? {
            total += chunk.len() as u64;
            if total > self.max_bytes {
                ::log::warn!("Attachment {} exceeds {} bytes, discarded", url, self.max_bytes);
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            if head.len() < 16 {
                let take = (16 - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok((total, head))
    }
}

fn strip_params(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Header, then extension, then magic bytes
pub fn resolve_content_type(header: Option<&str>, filename: &str, head: &[u8]) -> String {
    if let Some(ct) = header.filter(|ct| !ct.is_empty() && *ct != OCTET_STREAM) {
        return ct.to_string();
    }
    if let Some(ct) = guess_from_extension(filename) {
        return ct.to_string();
    }
    sniff(head).unwrap_or(OCTET_STREAM).to_string()
}

fn guess_from_extension(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ct = match ext.to_ascii_lowercase().as_str() {
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "opus" | "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(ct)
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    let ct = if head.starts_with(b"%PDF") {
        "application/pdf"
    } else if head.starts_with(b"\x89PNG") {
        "image/png"
    } else if head.starts_with(b"\xFF\xD8\xFF") {
        "image/jpeg"
    } else if head.starts_with(b"GIF8") {
        "image/gif"
    } else if head.starts_with(b"RIFF") && head.get(8..12) == Some(b"WAVE".as_slice()) {
        "audio/wav"
    } else if head.starts_with(b"OggS") {
        "audio/ogg"
    } else if head.starts_with(b"ID3") {
        "audio/mpeg"
    } else if head.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else {
        return None;
    };
    Some(ct)
}
