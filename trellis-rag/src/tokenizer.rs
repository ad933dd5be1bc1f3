//! Token counting for budget-driven chunking.

use crate::error::Result;
#[cfg(feature = "hf-tokenizers")]
use crate::error::RagError;

/// Counts tokens in a piece of text.
///
/// Chunking budgets are expressed in tokens, so the chunker needs a counter
/// that matches (or approximates) the tokenizer of the downstream embedding
/// model. Counting must be deterministic: the same text always yields the
/// same count.
pub trait TokenCounter: Send + Sync {
    /// Returns the number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// A deterministic approximation of subword tokenizers.
///
/// Subword vocabularies average roughly four characters per token on
/// English prose, with whitespace-separated words as a lower bound. This
/// counter takes the larger of the two estimates. Use
/// [`HuggingFaceTokenCounter`] (feature `hf-tokenizers`) when exact counts
/// for a specific vocabulary matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl HeuristicTokenCounter {
    /// Creates a heuristic counter.
    pub fn new() -> Self {
        Self
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        let chars = text.chars().count();
        let words = text.split_whitespace().count();
        Ok(words.max(chars.div_ceil(4)))
    }
}

// ── HuggingFace tokenizer adapter ───────────────────────────────────────────

/// A [`TokenCounter`] backed by a HuggingFace `tokenizers` vocabulary.
#[cfg(feature = "hf-tokenizers")]
pub struct HuggingFaceTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizers")]
impl HuggingFaceTokenCounter {
    /// Wraps an already-loaded tokenizer.
    pub fn new(tokenizer: tokenizers::Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Loads a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|e| {
            RagError::ConfigError(format!(
                "failed to load tokenizer from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self { tokenizer })
    }
}

#[cfg(feature = "hf-tokenizers")]
impl TokenCounter for HuggingFaceTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        self.tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| RagError::ChunkingError(format!("tokenization failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_zero() {
        let counter = HeuristicTokenCounter::new();
        assert_eq!(counter.count_tokens("").unwrap(), 0);
    }

    #[test]
    fn count_grows_with_text() {
        let counter = HeuristicTokenCounter::new();
        let short = counter.count_tokens("a short sentence").unwrap();
        let long = counter
            .count_tokens("a much longer sentence with quite a few more words in it")
            .unwrap();
        assert!(long > short);
    }

    #[test]
    fn word_count_is_a_lower_bound() {
        let counter = HeuristicTokenCounter::new();
        let text = "one two three four five";
        assert!(counter.count_tokens(text).unwrap() >= 5);
    }
}
