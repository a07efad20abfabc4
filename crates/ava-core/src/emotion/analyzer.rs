//! Lexicon-based emotion analysis.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use super::lexicon::{self, Emotion};
use crate::error::{AvaError, Result};
use crate::models::{clamp_unit, EmotionalContext};

/// How far back a negator reaches.
const NEGATION_WINDOW: usize = 2;

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("static regex"))
}

/// Lower-cased word tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Stateless analyzer turning text into an [`EmotionalContext`].
#[derive(Debug, Clone)]
pub struct EmotionAnalyzer {
    model_label: String,
}

impl EmotionAnalyzer {
    pub fn new(model_label: impl Into<String>) -> Self {
        Self {
            model_label: model_label.into(),
        }
    }

    pub fn model_label(&self) -> &str {
        &self.model_label
    }

    /// Analyze `text`. Empty or whitespace-only input is rejected.
    pub fn analyze(&self, text: &str) -> Result<EmotionalContext> {
        if text.trim().is_empty() {
            return Err(AvaError::InvalidInput("text must not be empty".to_string()));
        }

        let tokens = tokenize(text);
        let exclamations = text.matches('!').count().min(3) as f64;

        let mut scores: BTreeMap<Emotion, f64> = BTreeMap::new();
        let mut hits = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            let Some((mut emotion, mut weight)) = lexicon::lookup(token) else {
                continue;
            };
            let window = &tokens[i.saturating_sub(NEGATION_WINDOW)..i];
            if window.iter().any(|w| lexicon::is_negator(w)) {
                emotion = emotion.opposite();
                weight *= 0.8;
            }
            if let Some(factor) = i
                .checked_sub(1)
                .and_then(|prev| lexicon::modifier(&tokens[prev]))
            {
                weight *= factor;
            }
            *scores.entry(emotion).or_insert(0.0) += weight;
            hits += 1;
        }

        let ctx = if hits == 0 {
            let mut neutral = EmotionalContext::neutral();
            neutral.arousal = clamp_unit(neutral.arousal + 0.1 * exclamations);
            neutral
        } else {
            let total: f64 = scores.values().sum();
            // BTreeMap iteration is ordered, so ties resolve deterministically.
            let (winner, winner_score) = scores
                .iter()
                .fold((Emotion::Joy, f64::MIN), |best, (e, s)| {
                    if *s > best.1 {
                        (*e, *s)
                    } else {
                        best
                    }
                });

            let valence = scores.iter().map(|(e, s)| e.valence() * s).sum::<f64>() / total;
            let arousal = scores.iter().map(|(e, s)| e.arousal() * s).sum::<f64>() / total
                + 0.1 * exclamations;
            let intensity = 0.4 + 0.3 * winner_score + 0.05 * exclamations;
            let confidence = winner_score / total;

            EmotionalContext::new(winner.as_str(), intensity, valence, arousal)
                .with_confidence(confidence)
        };

        let score_map: serde_json::Map<String, serde_json::Value> = scores
            .iter()
            .map(|(e, s)| (e.as_str().to_string(), json!(s)))
            .collect();

        Ok(ctx
            .with_metadata("model", json!(self.model_label))
            .with_metadata("hits", json!(hits))
            .with_metadata("scores", serde_json::Value::Object(score_map)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> EmotionAnalyzer {
        EmotionAnalyzer::new("lexicon-test")
    }

    #[test]
    fn test_tokenize_keeps_contractions() {
        assert_eq!(
            tokenize("I DON'T know, it's fine!"),
            vec!["i", "don't", "know", "it's", "fine"]
        );
    }

    #[test]
    fn test_happy_text_is_joy() {
        let ctx = analyzer().analyze("I'm really happy about this!").unwrap();
        assert_eq!(ctx.primary, "joy");
        assert!(ctx.valence > 0.5);
        assert!(ctx.intensity > 0.7);
        assert_eq!(ctx.metadata["model"], "lexicon-test");
    }

    #[test]
    fn test_intensifier_raises_intensity() {
        let plain = analyzer().analyze("I am happy").unwrap();
        let strong = analyzer().analyze("I am very happy").unwrap();
        assert!(strong.intensity > plain.intensity);
    }

    #[test]
    fn test_negation_flips_emotion() {
        let ctx = analyzer().analyze("I am not happy with this").unwrap();
        assert_eq!(ctx.primary, "sadness");
        assert!(ctx.valence < 0.0);
    }

    #[test]
    fn test_contraction_negation() {
        let ctx = analyzer().analyze("I don't trust them").unwrap();
        assert_eq!(ctx.primary, "disgust");
    }

    #[test]
    fn test_no_hits_is_neutral() {
        let ctx = analyzer().analyze("The table is made of wood.").unwrap();
        assert_eq!(ctx.primary, "neutral");
        assert_eq!(ctx.confidence, 0.5);
        assert_eq!(ctx.valence, 0.0);
    }

    #[test]
    fn test_exclamations_raise_arousal() {
        let calm = analyzer().analyze("I am scared").unwrap();
        let loud = analyzer().analyze("I am scared!!!").unwrap();
        assert!(loud.arousal > calm.arousal);
    }

    #[test]
    fn test_mixed_emotions_pick_strongest() {
        let ctx = analyzer()
            .analyze("I was a bit worried but now I'm thrilled and delighted")
            .unwrap();
        assert_eq!(ctx.primary, "joy");
        assert!(ctx.confidence < 1.0);

        let scores = ctx.metadata["scores"].as_object().unwrap();
        let total: f64 = scores.values().filter_map(|s| s.as_f64()).sum();
        let joy = scores["joy"].as_f64().unwrap();
        assert!((ctx.confidence - joy / total).abs() < 1e-9);
    }

    #[test]
    fn test_single_emotion_is_fully_confident() {
        let ctx = analyzer().analyze("I am happy").unwrap();
        assert_eq!(ctx.primary, "joy");
        assert_eq!(ctx.confidence, 1.0);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            analyzer().analyze("   "),
            Err(AvaError::InvalidInput(_))
        ));
    }
}
