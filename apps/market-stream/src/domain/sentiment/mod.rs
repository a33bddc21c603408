//! News Sentiment Heuristic
//!
//! Pure keyword-density scorer for short financial text (headlines, news
//! blurbs). No I/O, no randomness: identical input always yields identical
//! output.
//!
//! # Scoring
//!
//! Tokens are whitespace-split and lowercased, then matched against fixed
//! positive and negative keyword sets by substring ("bullishly" matches
//! "bullish"). The score is the positive share of all keyword hits, 0.5 when
//! no keyword matched. Confidence grows with the fraction of tokens that
//! carried sentiment, capped at [`MAX_CONFIDENCE`].

use serde::Serialize;

/// Upper bound on reported confidence.
pub const MAX_CONFIDENCE: f64 = 0.8;

/// Score at or above which text is labeled positive.
const POSITIVE_THRESHOLD: f64 = 0.6;

/// Score at or below which text is labeled negative.
const NEGATIVE_THRESHOLD: f64 = 0.4;

/// Keywords signalling positive sentiment.
const POSITIVE_KEYWORDS: &[&str] = &[
    "bullish", "growth", "strong", "gain", "rally", "surge", "beat", "upgrade", "profit",
    "outperform", "record", "soar", "momentum", "buy",
];

/// Keywords signalling negative sentiment.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "bearish", "decline", "weak", "loss", "drop", "miss", "downgrade", "crash", "plunge",
    "fear", "selloff", "underperform", "recession", "sell",
];

// =============================================================================
// Result Type
// =============================================================================

/// Sentiment classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    /// Predominantly positive keyword hits.
    Positive,
    /// No clear lean either way.
    Neutral,
    /// Predominantly negative keyword hits.
    Negative,
}

/// Result of scoring one piece of text. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentResult {
    /// Positive share of keyword hits, in [0, 1]. 0.5 when no keyword hit.
    pub score: f64,
    /// Classification derived from the score.
    pub label: SentimentLabel,
    /// Fraction of tokens that carried sentiment, capped at
    /// [`MAX_CONFIDENCE`]; 0 for empty input.
    pub confidence: f64,
}

// =============================================================================
// Scoring
// =============================================================================

/// Score a short text for positive/negative keyword density.
#[must_use]
pub fn score(text: &str) -> SentimentResult {
    let mut positive = 0_usize;
    let mut negative = 0_usize;
    let mut bearing = 0_usize;
    let mut total = 0_usize;

    for token in text.split_whitespace() {
        total += 1;
        let token = token.to_lowercase();

        let hit_positive = POSITIVE_KEYWORDS.iter().any(|kw| token.contains(kw));
        let hit_negative = NEGATIVE_KEYWORDS.iter().any(|kw| token.contains(kw));

        if hit_positive {
            positive += 1;
        }
        if hit_negative {
            negative += 1;
        }
        if hit_positive || hit_negative {
            bearing += 1;
        }
    }

    let hits = positive + negative;
    #[allow(clippy::cast_precision_loss)]
    let score = if hits == 0 {
        0.5
    } else {
        positive as f64 / hits as f64
    };

    let label = if score >= POSITIVE_THRESHOLD {
        SentimentLabel::Positive
    } else if score <= NEGATIVE_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    #[allow(clippy::cast_precision_loss)]
    let confidence = if total == 0 {
        0.0
    } else {
        (bearing as f64 / total as f64).min(MAX_CONFIDENCE)
    };

    SentimentResult {
        score,
        label,
        confidence,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test]
    fn positive_text_labeled_positive() {
        let result = score("bullish growth strong");
        assert_eq!(result.label, SentimentLabel::Positive);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_text_labeled_negative() {
        let result = score("bearish decline weak");
        assert_eq!(result.label, SentimentLabel::Negative);
        assert!(result.score.abs() < f64::EPSILON);
    }

    #[test]
    fn text_without_keywords_is_neutral() {
        let result = score("the market opened today");
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score("bullish bullish bullish");
        let b = score("bullish bullish bullish");
        assert_eq!(a, b);
    }

    #[test]
    fn substring_matching_catches_inflections() {
        let result = score("stocks rallied bullishly");
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(score("BULLISH Growth").label, SentimentLabel::Positive);
    }

    #[test]
    fn mixed_text_balances_toward_neutral() {
        // One positive hit, one negative hit: score 0.5
        let result = score("strong quarter but bearish outlook");
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.label, SentimentLabel::Neutral);
    }

    #[test]
    fn confidence_reflects_keyword_density() {
        let dense = score("bullish rally surge");
        let sparse = score("the bullish report was published on a quiet day");

        assert!(dense.confidence > sparse.confidence);
    }

    #[test]
    fn confidence_capped_at_maximum() {
        let result = score("bullish bullish bullish bullish");
        assert!((result.confidence - MAX_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_is_neutral_with_zero_confidence() {
        let result = score("");
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test_case(5, 0 => SentimentLabel::Positive ; "all positive")]
    #[test_case(3, 2 => SentimentLabel::Positive ; "at positive threshold")]
    #[test_case(1, 1 => SentimentLabel::Neutral ; "balanced")]
    #[test_case(2, 3 => SentimentLabel::Negative ; "at negative threshold")]
    #[test_case(0, 5 => SentimentLabel::Negative ; "all negative")]
    fn label_thresholds(positives: usize, negatives: usize) -> SentimentLabel {
        let mut tokens = vec!["bullish"; positives];
        tokens.extend(vec!["bearish"; negatives]);
        score(&tokens.join(" ")).label
    }

    proptest! {
        #[test]
        fn pure_for_arbitrary_input(text in ".{0,200}") {
            let a = score(&text);
            let b = score(&text);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn score_and_confidence_stay_in_range(text in ".{0,200}") {
            let result = score(&text);
            prop_assert!((0.0..=1.0).contains(&result.score));
            prop_assert!((0.0..=MAX_CONFIDENCE).contains(&result.confidence));
        }
    }
}
