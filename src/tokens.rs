//! Approximate token accounting for budget comparisons.
//!
//! Counts are deterministic for identical input and are only ever compared
//! against budgets, never sent to a provider. When no vocabulary file is
//! configured (or it fails to load) a whitespace/length heuristic is used.

use std::sync::Arc;

use tokenizers::Tokenizer;

/// Token counter with an optional real vocabulary behind it.
#[derive(Clone, Default)]
pub struct TokenCounter {
    tokenizer: Option<Arc<Tokenizer>>,
}

impl TokenCounter {
    /// Counter using only the heuristic.
    pub fn heuristic() -> Self {
        Self { tokenizer: None }
    }

    /// Load a `tokenizers` vocabulary from disk. A load failure is not an
    /// error: the counter degrades to the heuristic and logs once.
    pub fn from_vocabulary(path: &str) -> Self {
        match Tokenizer::from_file(path) {
            Ok(tokenizer) => Self {
                tokenizer: Some(Arc::new(tokenizer)),
            },
            Err(e) => {
                tracing::warn!("Failed to load tokenizer from {}: {}. Using heuristic.", path, e);
                Self { tokenizer: None }
            }
        }
    }

    /// Approximate token count. Never fails.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        if let Some(tokenizer) = &self.tokenizer {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                return encoding.get_ids().len();
            }
        }

        // Whitespace-split heuristic, floored by bytes/4 so long unbroken
        // runs (prose without spaces, URLs) still budget realistically.
        let words = text.split_whitespace().count();
        words.max(text.len().div_ceil(4))
    }

    /// Sum of counts over multiple fragments.
    pub fn count_all<'a, I>(&self, texts: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts.into_iter().map(|t| self.count(t)).sum()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("vocabulary", &self.tokenizer.is_some())
            .finish()
    }
}
