//! Embedding and generation models, treated as opaque functions.
//!
//! `HashEmbedder` and `ExtractiveGenerator` are deterministic offline
//! implementations: the pipeline and the QA path run without an external model.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Timeouts, throttling and outages; retry by re-invocation.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The model refused the input (empty text, oversized prompt, ...).
    #[error("model rejected input: {0}")]
    Rejected(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        (**self).embed(text)
    }
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).generate(prompt)
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Words used for question/passage overlap; single characters are noise there.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    words(text).filter(|t| t.chars().count() >= 2)
}

/// Embedding features: every word, or every non-whitespace character when
/// the text has no alphanumerics (a lone "7", a bullet, "!?").
fn features(text: &str) -> Vec<String> {
    let found: Vec<String> = words(text).collect();
    if !found.is_empty() {
        return found;
    }
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect()
}

/// Feature-hashing embedder: each lowercase word (or, for text without any,
/// each symbol) adds a signed unit to one dimension chosen by its FNV-1a
/// hash, then the vector is L2-normalised.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let features = features(text);
        if features.is_empty() {
            return Err(ModelError::Rejected("text is blank".into()));
        }
        let mut vector = vec![0.0_f32; self.dimension];
        for feature in &features {
            let hash = fnv1a(feature.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Answers with the context passage sharing the most tokens with the
/// question, or the not-known reply when nothing overlaps.
///
/// Expects prompts rendered by [`crate::retrieval::render_prompt`].
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub const UNKNOWN_ANSWER: &'static str = "I don't know the answer based on the provided context.";
}

impl Generator for ExtractiveGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let (context, question) = crate::retrieval::split_prompt(prompt)
            .ok_or_else(|| ModelError::Rejected("prompt has no context/question sections".into()))?;

        let wanted: HashSet<String> = tokens(question).collect();
        let best = context
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| (tokens(p).filter(|t| wanted.contains(t)).count(), p))
            .filter(|(overlap, _)| *overlap > 0)
            // Ties keep the earlier (higher-ranked) passage.
            .fold(None::<(usize, &str)>, |best, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            });

        Ok(best
            .map(|(_, passage)| passage.to_string())
            .unwrap_or_else(|| Self::UNKNOWN_ANSWER.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hash_embedding_is_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("Quarterly revenue grew").unwrap();
        let b = embedder.embed("quarterly REVENUE grew").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_texts_are_closer_than_disjoint_ones() {
        let embedder = HashEmbedder::default();
        let q = embedder.embed("refund policy for damaged goods").unwrap();
        let near = embedder.embed("our refund policy covers damaged goods").unwrap();
        let far = embedder.embed("the office opens at nine").unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = HashEmbedder::default().embed(" \n\t ").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn short_and_symbol_only_text_still_embeds() {
        let embedder = HashEmbedder::new(32);
        for text in ["7", "a", "!?", "\u{2022}"] {
            let v = embedder.embed(text).unwrap();
            assert!((cosine(&v, &v) - 1.0).abs() < 1e-5, "{text:?}");
        }
        assert_ne!(embedder.embed("7").unwrap(), embedder.embed("8").unwrap());
    }

    #[test]
    fn extractive_generator_picks_best_passage() {
        let prompt = crate::retrieval::render_prompt(
            &["The office opens at nine.", "Refunds take five business days."],
            "How long do refunds take?",
        );
        let answer = ExtractiveGenerator.generate(&prompt).unwrap();
        assert_eq!(answer, "Refunds take five business days.");

        let unknown = crate::retrieval::render_prompt(&["Unrelated text."], "Where is Mars?");
        assert_eq!(
            ExtractiveGenerator.generate(&unknown).unwrap(),
            ExtractiveGenerator::UNKNOWN_ANSWER
        );
    }
}
