//! Lexical similarity between texts and memories.

use std::collections::HashMap;

use crate::emotion::analyzer::tokenize;
use crate::models::Memory;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "i", "i'm", "in", "is", "it", "it's", "its", "me", "my", "of", "on", "or",
    "our", "she", "so", "that", "the", "their", "them", "they", "this", "to", "was", "we", "were",
    "what", "when", "which", "who", "will", "with", "you", "your",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Up to `max` distinct content words of `text` (four letters or more), in
/// order of first appearance.
pub fn keywords(text: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if out.len() == max {
            break;
        }
        if token.len() >= 4 && !is_stop_word(&token) && !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Term-frequency vector.
pub type TermVector = HashMap<String, f64>;

pub fn term_vector(text: &str) -> TermVector {
    let mut v = TermVector::new();
    for token in tokenize(text) {
        if !is_stop_word(&token) {
            *v.entry(token).or_insert(0.0) += 1.0;
        }
    }
    v
}

/// Vector of a memory's content plus its themes.
pub fn memory_vector(memory: &Memory) -> TermVector {
    let mut v = term_vector(&memory.content);
    for theme in &memory.themes {
        for (term, n) in term_vector(theme) {
            *v.entry(term).or_insert(0.0) += n;
        }
    }
    v
}

/// Cosine similarity in `[0, 1]`; zero when either side is empty.
pub fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(t, x)| large.get(t).map(|y| x * y))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm = |v: &TermVector| v.values().map(|x| x * x).sum::<f64>().sqrt();
    (dot / (norm(a) * norm(b))).clamp(0.0, 1.0)
}

/// Ranking score used for relevant-memory retrieval.
pub fn relevance(similarity: f64, importance: f64) -> f64 {
    0.7 * similarity + 0.3 * importance
}
