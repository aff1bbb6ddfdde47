// OmniDetect Data Models
// Shared types passed between providers, the detection pipeline and history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::detection::verdict::round4;

// ============ Media ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Text,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
        }
    }
}

/// Payload handed to a provider. Providers reject the kind they do not handle.
#[derive(Debug, Copy, Clone)]
pub enum MediaInput<'a> {
    Image(&'a [u8]),
    Text(&'a str),
}

impl MediaInput<'_> {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Text(_) => MediaKind::Text,
        }
    }
}

// ============ Verdict ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    AiGenerated,
    HumanOrigin,
    Uncertain,
}

impl Verdict {
    /// User-facing label. The human label differs between images and text.
    pub fn label(&self, kind: MediaKind) -> &'static str {
        match (self, kind) {
            (Self::AiGenerated, _) => "AI Generated",
            (Self::HumanOrigin, MediaKind::Image) => "Human Created",
            (Self::HumanOrigin, MediaKind::Text) => "Human Written",
            (Self::Uncertain, _) => "Uncertain",
        }
    }
}

// ============ Provider Score ============

/// Successful provider answer, already normalized to P(AI-generated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: String,
    pub probability: f64,
    /// Self-reported certainty, when the provider gives one
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============ Detection Outcome ============

/// Result of one detection request at full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    pub media_kind: MediaKind,
    pub probability: f64,
    pub human_complement: f64,
    pub verdict: Verdict,
    pub confidence: f64,
    pub model_used: String,
}

impl DetectionOutcome {
    /// Rounded view of the outcome. The verdict was taken on the unrounded
    /// probability, so a score shown as `0.75` can still read "AI Generated".
    pub fn report(&self, filename: Option<&str>) -> DetectionReport {
        DetectionReport {
            filename: filename.map(|f| f.to_string()),
            ai_score: round4(self.probability),
            human_score: round4(self.human_complement),
            verdict: self.verdict.label(self.media_kind).to_string(),
            confidence: round4(self.confidence),
            model_used: self.model_used.clone(),
        }
    }

    pub fn to_history_record(&self, subject_label: &str) -> HistoryRecord {
        HistoryRecord {
            id: Uuid::new_v4(),
            subject_label: subject_label.to_string(),
            media_kind: self.media_kind,
            ai_score: round4(self.probability),
            human_score: round4(self.human_complement),
            verdict: self.verdict.label(self.media_kind).to_string(),
            confidence: round4(self.confidence),
            model_used: self.model_used.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Presentation shape of an outcome, rounded to 4 decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub ai_score: f64,
    pub human_score: f64,
    pub verdict: String,
    pub confidence: f64,
    pub model_used: String,
}

// ============ History ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    #[serde(alias = "filename")]
    pub subject_label: String,
    #[serde(alias = "file_type")]
    pub media_kind: MediaKind,
    pub ai_score: f64,
    pub human_score: f64,
    pub verdict: String,
    pub confidence: f64,
    #[serde(default)]
    pub model_used: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_analyses: usize,
    pub image_analyses: usize,
    pub text_analyses: usize,
    pub ai_detected: usize,
    pub human_detected: usize,
}

impl HistoryStats {
    pub fn from_records(records: &[HistoryRecord]) -> Self {
        let total = records.len();
        let images = records.iter().filter(|r| r.media_kind == MediaKind::Image).count();
        let ai = records
            .iter()
            .filter(|r| r.verdict == Verdict::AiGenerated.label(r.media_kind))
            .count();
        Self {
            total_analyses: total,
            image_analyses: images,
            text_analyses: total - images,
            ai_detected: ai,
            // Uncertain results are counted on the human side
            human_detected: total - ai,
        }
    }
}
