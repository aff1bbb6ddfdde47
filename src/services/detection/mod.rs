// Detection Module
// Detection orchestration organized into specialized submodules:
// - fallback: ordered provider chain, first success wins
// - heuristic: local rule-based text scorer
// - verdict: thresholds, derived confidence and presentation rounding
// - service: composes the above and writes history

pub mod fallback;
pub mod heuristic;
pub mod service;
pub mod verdict;

pub use fallback::{ChainFailure, FallbackChain, ProviderAttempt};
pub use heuristic::{score_text_heuristic, AI_TELL_PHRASES};
pub use service::{
    DetectionError, DetectionService, HEURISTIC_CONFIDENCE, HEURISTIC_MODEL, MIN_TEXT_CHARS,
    TEXT_SUBJECT_LABEL,
};
pub use verdict::{clamp_unit, derived_confidence, round4, verdict, AI_THRESHOLD, HUMAN_THRESHOLD};
