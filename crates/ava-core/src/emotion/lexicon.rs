//! Built-in emotion lexicon.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Basic emotions recognised by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Trust,
    Anticipation,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Disgust,
        Emotion::Trust,
        Emotion::Anticipation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Disgust => "disgust",
            Self::Trust => "trust",
            Self::Anticipation => "anticipation",
        }
    }

    /// Typical valence in `[-1, 1]`.
    pub fn valence(&self) -> f64 {
        match self {
            Self::Joy => 0.8,
            Self::Sadness => -0.7,
            Self::Anger => -0.6,
            Self::Fear => -0.7,
            Self::Surprise => 0.2,
            Self::Disgust => -0.6,
            Self::Trust => 0.6,
            Self::Anticipation => 0.4,
        }
    }

    /// Typical arousal in `[0, 1]`.
    pub fn arousal(&self) -> f64 {
        match self {
            Self::Joy => 0.6,
            Self::Sadness => 0.3,
            Self::Anger => 0.8,
            Self::Fear => 0.8,
            Self::Surprise => 0.8,
            Self::Disgust => 0.5,
            Self::Trust => 0.3,
            Self::Anticipation => 0.6,
        }
    }

    /// Opposite on Plutchik's wheel; used for negated words.
    pub fn opposite(&self) -> Emotion {
        match self {
            Self::Joy => Self::Sadness,
            Self::Sadness => Self::Joy,
            Self::Anger => Self::Fear,
            Self::Fear => Self::Anger,
            Self::Surprise => Self::Anticipation,
            Self::Anticipation => Self::Surprise,
            Self::Disgust => Self::Trust,
            Self::Trust => Self::Disgust,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ENTRIES: &[(&str, Emotion, f64)] = &[
    // joy
    ("happy", Emotion::Joy, 1.0),
    ("happiness", Emotion::Joy, 1.0),
    ("joy", Emotion::Joy, 1.0),
    ("joyful", Emotion::Joy, 1.2),
    ("glad", Emotion::Joy, 0.8),
    ("great", Emotion::Joy, 0.8),
    ("good", Emotion::Joy, 0.6),
    ("wonderful", Emotion::Joy, 1.2),
    ("fantastic", Emotion::Joy, 1.2),
    ("awesome", Emotion::Joy, 1.0),
    ("amazing", Emotion::Joy, 1.0),
    ("love", Emotion::Joy, 1.2),
    ("loved", Emotion::Joy, 1.2),
    ("lovely", Emotion::Joy, 1.0),
    ("delighted", Emotion::Joy, 1.2),
    ("pleased", Emotion::Joy, 0.8),
    ("cheerful", Emotion::Joy, 1.0),
    ("fun", Emotion::Joy, 0.7),
    ("enjoy", Emotion::Joy, 0.8),
    ("enjoyed", Emotion::Joy, 0.8),
    ("smile", Emotion::Joy, 0.7),
    ("laugh", Emotion::Joy, 0.8),
    ("grateful", Emotion::Joy, 1.0),
    ("thankful", Emotion::Joy, 1.0),
    ("thrilled", Emotion::Joy, 1.3),
    ("ecstatic", Emotion::Joy, 1.5),
    ("proud", Emotion::Joy, 0.9),
    // sadness
    ("sad", Emotion::Sadness, 1.0),
    ("unhappy", Emotion::Sadness, 1.0),
    ("depressed", Emotion::Sadness, 1.3),
    ("lonely", Emotion::Sadness, 1.0),
    ("miss", Emotion::Sadness, 0.6),
    ("cry", Emotion::Sadness, 1.0),
    ("crying", Emotion::Sadness, 1.0),
    ("tears", Emotion::Sadness, 0.9),
    ("grief", Emotion::Sadness, 1.3),
    ("sorrow", Emotion::Sadness, 1.2),
    ("heartbroken", Emotion::Sadness, 1.5),
    ("devastated", Emotion::Sadness, 1.5),
    ("gloomy", Emotion::Sadness, 0.8),
    ("disappointed", Emotion::Sadness, 0.9),
    ("hurt", Emotion::Sadness, 0.9),
    ("miserable", Emotion::Sadness, 1.3),
    ("tired", Emotion::Sadness, 0.5),
    // anger
    ("angry", Emotion::Anger, 1.0),
    ("mad", Emotion::Anger, 0.9),
    ("furious", Emotion::Anger, 1.5),
    ("annoyed", Emotion::Anger, 0.7),
    ("irritated", Emotion::Anger, 0.7),
    ("hate", Emotion::Anger, 1.2),
    ("rage", Emotion::Anger, 1.4),
    ("frustrated", Emotion::Anger, 0.9),
    ("frustrating", Emotion::Anger, 0.9),
    ("outraged", Emotion::Anger, 1.4),
    ("upset", Emotion::Anger, 0.8),
    // fear
    ("afraid", Emotion::Fear, 1.0),
    ("scared", Emotion::Fear, 1.0),
    ("fear", Emotion::Fear, 1.0),
    ("worried", Emotion::Fear, 0.8),
    ("worry", Emotion::Fear, 0.8),
    ("anxious", Emotion::Fear, 0.9),
    ("nervous", Emotion::Fear, 0.8),
    ("terrified", Emotion::Fear, 1.5),
    ("panic", Emotion::Fear, 1.3),
    ("frightened", Emotion::Fear, 1.1),
    ("dread", Emotion::Fear, 1.1),
    ("stressed", Emotion::Fear, 0.8),
    // surprise
    ("surprised", Emotion::Surprise, 1.0),
    ("surprise", Emotion::Surprise, 0.9),
    ("wow", Emotion::Surprise, 0.9),
    ("unexpected", Emotion::Surprise, 0.8),
    ("shocked", Emotion::Surprise, 1.2),
    ("astonished", Emotion::Surprise, 1.2),
    ("suddenly", Emotion::Surprise, 0.6),
    // disgust
    ("disgusting", Emotion::Disgust, 1.3),
    ("disgusted", Emotion::Disgust, 1.3),
    ("gross", Emotion::Disgust, 1.0),
    ("awful", Emotion::Disgust, 0.9),
    ("horrible", Emotion::Disgust, 1.0),
    ("revolting", Emotion::Disgust, 1.3),
    ("nasty", Emotion::Disgust, 0.9),
    ("yuck", Emotion::Disgust, 1.0),
    // trust
    ("trust", Emotion::Trust, 1.0),
    ("reliable", Emotion::Trust, 0.8),
    ("safe", Emotion::Trust, 0.8),
    ("confident", Emotion::Trust, 0.8),
    ("believe", Emotion::Trust, 0.6),
    ("honest", Emotion::Trust, 0.8),
    ("secure", Emotion::Trust, 0.8),
    ("calm", Emotion::Trust, 0.7),
    ("friend", Emotion::Trust, 0.6),
    // anticipation
    ("hope", Emotion::Anticipation, 0.9),
    ("hopeful", Emotion::Anticipation, 1.0),
    ("expect", Emotion::Anticipation, 0.6),
    ("excited", Emotion::Anticipation, 1.1),
    ("eager", Emotion::Anticipation, 1.0),
    ("curious", Emotion::Anticipation, 0.8),
    ("waiting", Emotion::Anticipation, 0.5),
    ("soon", Emotion::Anticipation, 0.4),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "neither", "nor", "cannot", "without", "hardly",
];

const INTENSIFIERS: &[&str] = &[
    "very",
    "really",
    "so",
    "extremely",
    "incredibly",
    "super",
    "totally",
    "absolutely",
    "truly",
    "deeply",
];

const DIMINISHERS: &[&str] = &["slightly", "somewhat", "bit", "little", "kinda", "barely"];

fn table() -> &'static HashMap<&'static str, (Emotion, f64)> {
    static TABLE: OnceLock<HashMap<&'static str, (Emotion, f64)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        ENTRIES
            .iter()
            .map(|(word, emotion, weight)| (*word, (*emotion, *weight)))
            .collect()
    })
}

/// Look up a lower-cased word.
pub fn lookup(word: &str) -> Option<(Emotion, f64)> {
    table().get(word).copied()
}

pub fn is_negator(word: &str) -> bool {
    NEGATORS.contains(&word) || word.ends_with("n't")
}

/// Multiplier applied to the following lexicon hit, if `word` modifies it.
pub fn modifier(word: &str) -> Option<f64> {
    if INTENSIFIERS.contains(&word) {
        Some(1.5)
    } else if DIMINISHERS.contains(&word) {
        Some(0.5)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(lookup("happy").map(|(e, _)| e), Some(Emotion::Joy));
        assert!(lookup("table").is_none());
    }

    #[test]
    fn opposites_are_symmetric() {
        for e in Emotion::ALL {
            assert_eq!(e.opposite().opposite(), e);
        }
    }

    #[test]
    fn contractions_negate() {
        assert!(is_negator("don't"));
        assert!(is_negator("never"));
        assert!(!is_negator("happy"));
    }

    #[test]
    fn entries_are_unique() {
        assert_eq!(table().len(), ENTRIES.len());
    }
}
