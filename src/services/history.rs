// Detection History
// Persistence collaborator for detection outcomes. The pipeline only appends;
// listing, stats and deletion serve the CLI.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{HistoryRecord, HistoryStats};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history record (de)serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError>;

    /// Most recent records first
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Remove one record; `Ok(false)` when no record has that id
    async fn delete(&self, id: Uuid) -> Result<bool, HistoryError>;

    async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let records = self.recent(usize::MAX).await?;
        Ok(HistoryStats::from_records(&records))
    }
}

/// In-process store, used by tests and embedders without a file
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.lock().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

/// Append-only JSON-lines file, one record per line
pub struct JsonlHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_lines(&self) -> Result<Option<String>, HistoryError> {
        match fs::read_to_string(&self.path).await {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let Some(content) = self.read_lines().await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "[HISTORY] skipping malformed line {} in {}: {}",
                    idx + 1,
                    self.path.display(),
                    e
                ),
            }
        }

        Ok(records.into_iter().rev().take(limit).collect())
    }

    /// Rewrites the file without the matching line. Lines that do not parse
    /// are kept as they are.
    async fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let _guard = self.write_lock.lock().await;
        let Some(content) = self.read_lines().await? else {
            return Ok(false);
        };

        let mut removed = false;
        let mut kept = String::with_capacity(content.len());
        for line in content.lines() {
            let matches = serde_json::from_str::<HistoryRecord>(line)
                .map(|r| r.id == id)
                .unwrap_or(false);
            if matches && !removed {
                removed = true;
                continue;
            }
            if !line.trim().is_empty() {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if removed {
            let tmp = self.path.with_extension("jsonl.tmp");
            fs::write(&tmp, kept).await?;
            fs::rename(&tmp, &self.path).await?;
            info!("[HISTORY] deleted record {}", id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectionOutcome, MediaKind, Verdict};

    fn record(kind: MediaKind, probability: f64, verdict: Verdict, label: &str) -> HistoryRecord {
        DetectionOutcome {
            media_kind: kind,
            probability,
            human_complement: 1.0 - probability,
            verdict,
            confidence: 0.45,
            model_used: "Heuristic".to_string(),
        }
        .to_history_record(label)
    }

    #[tokio::test]
    async fn test_memory_history_recent_order() {
        let history = MemoryHistory::new();
        history.append(record(MediaKind::Text, 0.1, Verdict::HumanOrigin, "first")).await.unwrap();
        history.append(record(MediaKind::Text, 0.9, Verdict::AiGenerated, "second")).await.unwrap();

        let recent = history.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject_label, "second");
        assert_eq!(history.len().await, 2);
    }

    #[tokio::test]
    async fn test_jsonl_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(dir.path().join("nested").join("history.jsonl"));

        assert!(history.recent(10).await.unwrap().is_empty());

        history.append(record(MediaKind::Image, 0.95, Verdict::AiGenerated, "a.png")).await.unwrap();
        history.append(record(MediaKind::Text, 0.5, Verdict::Uncertain, "text_analysis")).await.unwrap();

        let recent = history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].subject_label, "text_analysis");
        assert_eq!(recent[1].verdict, "AI Generated");

        let stats = history.stats().await.unwrap();
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.image_analyses, 1);
        assert_eq!(stats.ai_detected, 1);
    }

    #[tokio::test]
    async fn test_jsonl_history_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = JsonlHistory::new(path.clone());
        history.append(record(MediaKind::Text, 0.2, Verdict::HumanOrigin, "ok")).await.unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"not json\n").await.unwrap();
        file.flush().await.unwrap();

        let recent = history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].verdict, "Human Written");
    }

    #[tokio::test]
    async fn test_memory_history_delete() {
        let history = MemoryHistory::new();
        let keep = record(MediaKind::Text, 0.1, Verdict::HumanOrigin, "keep");
        let gone = record(MediaKind::Text, 0.9, Verdict::AiGenerated, "drop");
        let gone_id = gone.id;
        history.append(keep).await.unwrap();
        history.append(gone).await.unwrap();

        assert!(history.delete(gone_id).await.unwrap());
        assert!(!history.delete(gone_id).await.unwrap());
        let recent = history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject_label, "keep");
    }

    #[tokio::test]
    async fn test_jsonl_history_delete_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = JsonlHistory::new(path.clone());

        assert!(!history.delete(Uuid::new_v4()).await.unwrap());

        let first = record(MediaKind::Image, 0.95, Verdict::AiGenerated, "a.png");
        let second = record(MediaKind::Image, 0.05, Verdict::HumanOrigin, "b.png");
        let first_id = first.id;
        history.append(first).await.unwrap();
        history.append(second).await.unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"not json\n").await.unwrap();
        file.flush().await.unwrap();

        assert!(history.delete(first_id).await.unwrap());
        assert!(!history.delete(first_id).await.unwrap());

        let recent = history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject_label, "b.png");

        let raw = fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("not json"));
        assert!(!dir.path().join("history.jsonl.tmp").exists());
    }
}
