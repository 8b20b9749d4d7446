//! N-gram overlap guard against an agent parroting recent dialogue.

use std::collections::HashSet;

use reverie_core::dialogue::DialogueTurn;
use reverie_core::text::word_tokens;

use crate::perception::NONE_MARKER;

/// Distinct `n`-grams of `sentence`. Falls back to unigrams when the
/// sentence has fewer than `n` tokens.
#[must_use]
pub fn ngrams(sentence: &str, n: usize) -> HashSet<Vec<String>> {
    let tokens = word_tokens(sentence);
    if tokens.is_empty() {
        return HashSet::new();
    }
    let n = if tokens.len() < n { 1 } else { n.max(1) };
    tokens.windows(n).map(<[String]>::to_vec).collect()
}

/// Share of the candidate's `n`-grams that also occur in `reference`.
/// Zero when either side has no tokens.
#[must_use]
pub fn overlap_ratio(candidate: &str, reference: &str, n: usize) -> f64 {
    let candidate = ngrams(candidate, n);
    if candidate.is_empty() {
        return 0.0;
    }
    let reference = ngrams(reference, n);
    if reference.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = candidate.intersection(&reference).count() as f64 / candidate.len() as f64;
    ratio
}

/// The last `window` non-empty sentences of `history`, partner line before
/// own line within each turn. Lines reading `none` are skipped.
#[must_use]
pub fn recent_sentences(history: &[DialogueTurn], window: usize) -> Vec<String> {
    let sentences: Vec<String> = history
        .iter()
        .flat_map(|turn| [turn.partner.trim(), turn.own.trim()])
        .filter(|s| !s.is_empty() && *s != NONE_MARKER)
        .map(str::to_string)
        .collect();
    let skip = sentences.len().saturating_sub(window);
    sentences.into_iter().skip(skip).collect()
}

/// Sentences the candidate overlaps with by more than `threshold`.
#[must_use]
pub fn offending_sentences(
    candidate: &str,
    recent: &[String],
    n: usize,
    threshold: f64,
) -> Vec<String> {
    recent
        .iter()
        .filter(|s| overlap_ratio(candidate, s, n) > threshold)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sentences_fall_back_to_unigrams() {
        let grams = ngrams("Hello!", 2);
        assert_eq!(grams.len(), 1);
        assert!(grams.contains(&vec!["hello".to_string()]));
    }

    #[test]
    fn ratio_is_relative_to_candidate() {
        // candidate bigrams: "good morning", "morning mina" ; one shared
        let r = overlap_ratio("Good morning, Mina", "good morning to you", 2);
        assert!((r - 0.5).abs() < 1e-12);
        let ratio = overlap_ratio("Good morning, Mina", "Good morning, Mina!", 2);
        assert!((ratio - 1.0).abs() < 1e-12);
        assert!(overlap_ratio("...", "anything", 2).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_sentences_window_and_markers() {
        let history = vec![
            DialogueTurn::new("one", "two"),
            DialogueTurn::new("none", "three"),
            DialogueTurn::pending("four"),
        ];
        assert_eq!(recent_sentences(&history, 3), vec!["two", "three", "four"]);
        assert!(recent_sentences(&history, 0).is_empty());
    }

    #[test]
    fn only_sentences_above_threshold_offend() {
        let recent = vec!["good morning to you".to_string(), "see you later".to_string()];
        assert!(offending_sentences("Good morning, Mina", &recent, 2, 0.5).is_empty());
        assert_eq!(
            offending_sentences("good morning to you too", &recent, 2, 0.5),
            vec!["good morning to you"]
        );
    }
}
