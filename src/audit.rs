//! Append-only JSON-lines log of rejected submissions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One rejected submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC, ISO-8601
    pub timestamp: String,
    pub url: String,
    pub answer: Value,
    pub reason: Option<String>,
    pub attempt_number: u32,
}

impl AuditRecord {
    pub fn new(url: &str, answer: Value, reason: Option<String>, attempt_number: u32) -> Self {
        Self::at(Utc::now(), url, answer, reason, attempt_number)
    }

    pub fn at(
        when: DateTime<Utc>,
        url: &str,
        answer: Value,
        reason: Option<String>,
        attempt_number: u32,
    ) -> Self {
        Self {
            timestamp: when.to_rfc3339_opts(SecondsFormat::Millis, true),
            url: url.to_string(),
            answer,
            reason,
            attempt_number,
        }
    }
}

/// Shared between jobs. Each record is written with a single `write_all` on an
/// append-mode handle while holding the lock, so lines never interleave.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one record
    pub async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Read every record back, skipping lines that do not parse
    pub async fn read_all(&self) -> std::io::Result<Vec<AuditRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("logs/failures.jsonl"));

        log.append(&AuditRecord::new("https://q.example/1", json!(42), Some("wrong".into()), 1))
            .await
            .unwrap();
        log.append(&AuditRecord::new("https://q.example/1", Value::Null, None, 2))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let records = log.read_all().await.unwrap();
        assert_eq!(records[0].answer, json!(42));
        assert_eq!(records[0].reason.as_deref(), Some("wrong"));
        assert_eq!(records[1].attempt_number, 2);
        assert!(records[1].timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AuditLog::new(dir.path().join("failures.jsonl")));

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let reason = "x".repeat(500);
                log.append(&AuditRecord::new("https://q.example/", json!(i), Some(reason), i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 20);
        for line in raw.lines() {
            serde_json::from_str::<AuditRecord>(line).unwrap();
        }
    }

    #[test]
    fn test_timestamp_format() {
        let when = DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = AuditRecord::at(when, "u", Value::Null, None, 1);
        assert_eq!(record.timestamp, "2025-01-02T03:04:05.000Z");
    }
}
