// Verdict Engine
// Thresholds and presentation rounding. Rounding happens only at the boundary.

use crate::models::Verdict;

/// Strictly above this probability the media is AI generated
pub const AI_THRESHOLD: f64 = 0.75;
/// Strictly below this probability the media is of human origin
pub const HUMAN_THRESHOLD: f64 = 0.25;

pub fn verdict(probability: f64) -> Verdict {
    if probability > AI_THRESHOLD {
        Verdict::AiGenerated
    } else if probability < HUMAN_THRESHOLD {
        Verdict::HumanOrigin
    } else {
        Verdict::Uncertain
    }
}

/// Confidence when the provider does not report one: 1 at 0.5, 0 at either extreme.
pub fn derived_confidence(probability: f64) -> f64 {
    clamp_unit(1.0 - 2.0 * (probability - 0.5).abs())
}

#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Round to 4 decimal places. Idempotent.
#[inline]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(verdict(0.9), Verdict::AiGenerated);
        assert_eq!(verdict(0.7501), Verdict::AiGenerated);
        assert_eq!(verdict(0.1), Verdict::HumanOrigin);
        assert_eq!(verdict(0.2499), Verdict::HumanOrigin);
        assert_eq!(verdict(0.5), Verdict::Uncertain);
    }

    #[test]
    fn test_verdict_boundaries_are_uncertain() {
        assert_eq!(verdict(0.75), Verdict::Uncertain);
        assert_eq!(verdict(0.25), Verdict::Uncertain);
    }

    #[test]
    fn test_verdict_sweep() {
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let expected = if p > 0.75 {
                Verdict::AiGenerated
            } else if p < 0.25 {
                Verdict::HumanOrigin
            } else {
                Verdict::Uncertain
            };
            assert_eq!(verdict(p), expected, "p={}", p);
        }
    }

    #[test]
    fn test_derived_confidence() {
        assert_eq!(derived_confidence(0.5), 1.0);
        assert_eq!(derived_confidence(0.0), 0.0);
        assert_eq!(derived_confidence(1.0), 0.0);
        assert!((derived_confidence(0.9) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }

    #[test]
    fn test_round4_is_idempotent() {
        for v in [0.0, 0.12345, 0.98765, 1.0 / 3.0, 0.30000000000000004, 0.99995] {
            let once = round4(v);
            assert_eq!(round4(once), once);
        }
        assert_eq!(round4(0.12345678), 0.1235);
    }
}
