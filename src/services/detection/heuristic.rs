// Heuristic Scorer
// Rule-based local fallback for text when no remote judgment is available.
// Deterministic: additive adjustments on a fixed base, each one capped.

use super::verdict::round4;

const BASE_SCORE: f64 = 0.30;
const SCORE_CAP: f64 = 0.95;
const PHRASE_BOOST: f64 = 0.18;
const SENTENCE_LEN_BOOST: f64 = 0.08;
const COMMA_BOOST: f64 = 0.05;
/// Inclusive words-per-sentence range typical of model output
const SENTENCE_LEN_RANGE: (f64, f64) = (13.0, 22.0);
const COMMA_RATIO: f64 = 0.07;

/// Phrases that frequently show up in assistant-style output (matched lower-cased)
pub const AI_TELL_PHRASES: [&str; 13] = [
    "as an ai",
    "language model",
    "i cannot",
    "i'm unable",
    "based on my training",
    "as an artificial intelligence",
    "i don't have the ability",
    "i must clarify",
    "certainly",
    "absolutely",
    "of course",
    "i understand your",
    "it's worth noting",
];

#[inline]
fn boost(score: f64, amount: f64) -> f64 {
    (score + amount).min(SCORE_CAP)
}

/// Score `text` for P(AI-generated), rounded to 4 decimals.
pub fn score_text_heuristic(text: &str) -> f64 {
    let mut score = BASE_SCORE;
    let lowered = text.to_lowercase();

    for phrase in AI_TELL_PHRASES {
        if lowered.contains(phrase) {
            score = boost(score, PHRASE_BOOST);
        }
    }

    let words = text.split_whitespace().count();
    let terminators = text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
    let avg_len = words as f64 / terminators.max(1) as f64;
    if avg_len >= SENTENCE_LEN_RANGE.0 && avg_len <= SENTENCE_LEN_RANGE.1 {
        score = boost(score, SENTENCE_LEN_BOOST);
    }

    let commas = text.chars().filter(|&c| c == ',').count();
    if commas as f64 > words as f64 * COMMA_RATIO {
        score = boost(score, COMMA_BOOST);
    }

    round4(score)
}
