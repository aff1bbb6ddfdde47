// Detection Service
// Single entry point per request: fallback chain (or heuristic) -> verdict -> history.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{DetectionOutcome, MediaInput, MediaKind, ProviderScore};
use crate::services::config_store::AppConfig;
use crate::services::history::HistoryStore;
use crate::services::providers::{image_providers, text_providers, ProviderError};

use super::fallback::FallbackChain;
use super::heuristic::score_text_heuristic;
use super::verdict::{clamp_unit, derived_confidence, verdict};

pub const HEURISTIC_MODEL: &str = "Heuristic";
pub const HEURISTIC_CONFIDENCE: f64 = 0.45;
pub const MIN_TEXT_CHARS: usize = 10;
/// History subject label for text requests
pub const TEXT_SUBJECT_LABEL: &str = "text_analysis";

/// Errors a detection caller can see
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("all {kind} providers failed ({attempts} attempted), last error: {reason}")]
    ChainExhausted {
        kind: &'static str,
        attempts: usize,
        reason: String,
    },
}

impl DetectionError {
    /// Stable machine-readable category
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ChainExhausted { .. } => "chain_exhausted",
        }
    }
}

pub struct DetectionService {
    image_chain: FallbackChain,
    text_chain: FallbackChain,
    history: Arc<dyn HistoryStore>,
}

impl DetectionService {
    pub fn new(
        image_chain: FallbackChain,
        text_chain: FallbackChain,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            image_chain,
            text_chain,
            history,
        }
    }

    /// Build the production chains (Sightengine -> HuggingFace, OpenRouter) from config
    pub fn from_config(
        config: &AppConfig,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self, ProviderError> {
        let image_chain = FallbackChain::new(
            MediaKind::Image,
            image_providers(&config.sightengine, &config.huggingface)?,
        );
        let text_chain = FallbackChain::new(MediaKind::Text, text_providers(&config.openrouter)?);
        info!(
            image = ?image_chain.provider_names(),
            text = ?text_chain.provider_names(),
            "[DETECT] provider chains ready"
        );
        Ok(Self::new(image_chain, text_chain, history))
    }

    /// Classify an image. There is no local fallback: if every provider fails
    /// the request fails with `ChainExhausted`.
    pub async fn detect_image(
        &self,
        image: &[u8],
        subject: &str,
    ) -> Result<DetectionOutcome, DetectionError> {
        if image.is_empty() {
            return Err(DetectionError::InvalidInput("missing image".to_string()));
        }

        let score = match self.image_chain.run(MediaInput::Image(image)).await {
            Ok(score) => score,
            Err(failure) => {
                warn!("[DETECT] image detection failed for {}: {}", subject, failure);
                return Err(DetectionError::ChainExhausted {
                    kind: failure.kind.as_str(),
                    attempts: failure.attempts.len(),
                    reason: failure.last_reason(),
                });
            }
        };

        let outcome = outcome_from_score(MediaKind::Image, score);
        self.persist(&outcome, subject).await;
        Ok(outcome)
    }

    /// Classify text. Remote failure falls back to the local heuristic, so only
    /// invalid input produces an error.
    pub async fn detect_text(&self, text: &str) -> Result<DetectionOutcome, DetectionError> {
        let text = text.trim();
        if text.chars().count() < MIN_TEXT_CHARS {
            return Err(DetectionError::InvalidInput(format!(
                "text too short (min {} chars)",
                MIN_TEXT_CHARS
            )));
        }

        let outcome = match self.text_chain.run(MediaInput::Text(text)).await {
            Ok(score) => outcome_from_score(MediaKind::Text, score),
            Err(failure) => {
                warn!("[DETECT] remote text detection unavailable, using heuristic: {}", failure);
                heuristic_outcome(text)
            }
        };

        self.persist(&outcome, TEXT_SUBJECT_LABEL).await;
        Ok(outcome)
    }

    async fn persist(&self, outcome: &DetectionOutcome, subject: &str) {
        let record = outcome.to_history_record(subject);
        let id = record.id;
        match self.history.append(record).await {
            Ok(()) => info!(
                id = %id,
                kind = outcome.media_kind.as_str(),
                model = %outcome.model_used,
                probability = outcome.probability,
                "[DETECT] outcome recorded"
            ),
            Err(e) => warn!("[DETECT] failed to record outcome {}: {}", id, e),
        }
    }
}

fn build_outcome(
    kind: MediaKind,
    probability: f64,
    confidence: f64,
    model_used: String,
) -> DetectionOutcome {
    DetectionOutcome {
        media_kind: kind,
        probability,
        human_complement: 1.0 - probability,
        verdict: verdict(probability),
        confidence,
        model_used,
    }
}

/// Normalize a provider answer. Self-reported confidence is used as-is (clamped);
/// otherwise it is derived from the probability.
fn outcome_from_score(kind: MediaKind, score: ProviderScore) -> DetectionOutcome {
    if let Some(reason) = score.reason.as_deref() {
        debug!(provider = %score.provider, reason, "[DETECT] provider reason");
    }
    let probability = clamp_unit(score.probability);
    let confidence = match score.confidence {
        Some(c) => clamp_unit(c),
        None => derived_confidence(probability),
    };
    build_outcome(kind, probability, confidence, score.provider)
}

fn heuristic_outcome(text: &str) -> DetectionOutcome {
    let probability = clamp_unit(score_text_heuristic(text));
    build_outcome(
        MediaKind::Text,
        probability,
        HEURISTIC_CONFIDENCE,
        HEURISTIC_MODEL.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;

    fn score(probability: f64, confidence: Option<f64>) -> ProviderScore {
        ProviderScore {
            provider: "stub".to_string(),
            probability,
            confidence,
            reason: None,
        }
    }

    #[test]
    fn test_outcome_clamps_probability() {
        let out = outcome_from_score(MediaKind::Image, score(1.3, None));
        assert_eq!(out.probability, 1.0);
        assert_eq!(out.human_complement, 0.0);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.verdict, Verdict::AiGenerated);
    }

    #[test]
    fn test_outcome_uses_reported_confidence() {
        let out = outcome_from_score(MediaKind::Text, score(0.6, Some(1.4)));
        assert_eq!(out.confidence, 1.0);
        assert_eq!(out.verdict, Verdict::Uncertain);
        assert_eq!(out.model_used, "stub");
    }

    #[test]
    fn test_human_complement_is_exact() {
        let out = outcome_from_score(MediaKind::Image, score(0.123456789, None));
        assert_eq!(out.human_complement, 1.0 - 0.123456789);
    }

    #[test]
    fn test_verdict_uses_unrounded_probability() {
        let out = outcome_from_score(MediaKind::Image, score(0.75004, None));
        assert_eq!(out.verdict, Verdict::AiGenerated);

        let report = out.report(None);
        assert_eq!(report.ai_score, 0.75);
        assert_eq!(report.verdict, "AI Generated");

        let edge = outcome_from_score(MediaKind::Image, score(0.75, None));
        assert_eq!(edge.verdict, Verdict::Uncertain);
    }

    #[test]
    fn test_heuristic_outcome() {
        let out = heuristic_outcome("Certainly, here is the answer you wanted today");
        assert_eq!(out.model_used, HEURISTIC_MODEL);
        assert_eq!(out.confidence, HEURISTIC_CONFIDENCE);
        assert_eq!(out.media_kind, MediaKind::Text);
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(DetectionError::InvalidInput("x".into()).category(), "invalid_input");
        let err = DetectionError::ChainExhausted {
            kind: "image",
            attempts: 2,
            reason: "HuggingFace: HTTP 503: down".into(),
        };
        assert_eq!(err.category(), "chain_exhausted");
        assert!(err.to_string().contains("HuggingFace"));
    }
}
