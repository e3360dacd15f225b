//! Token counting.
//!
//! The chunker needs a deterministic estimate of how many model tokens a
//! string occupies. [`TiktokenCounter`] uses the `cl100k_base` BPE vocabulary
//! (GPT-4 family); [`CharEstimateCounter`] is the cheap 4-chars-per-token
//! heuristic, used as a fallback and in tests where exact counts matter.
//!
//! Counts are only approximate for models with a different vocabulary, which
//! is why the chunk budget is a config value rather than a constant.

use std::sync::{Arc, OnceLock};

use anyhow::{bail, Result};
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Estimates the number of model tokens in a string.
pub trait TokenCounter: Send + Sync {
    /// Short identifier for logs (`"cl100k"`, `"chars"`).
    fn name(&self) -> &str;
    /// Token estimate for `text`. Stable across calls for identical input.
    fn count(&self, text: &str) -> usize;
}

/// Approximate characters-per-token ratio for the heuristic counter.
const CHARS_PER_TOKEN: usize = 4;

/// `ceil(chars / 4)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimateCounter;

impl TokenCounter for CharEstimateCounter {
    fn name(&self) -> &str {
        "chars"
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// The BPE tables take a while to build, so they are loaded once per process.
static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k() -> Option<&'static CoreBPE> {
    CL100K.get_or_init(|| cl100k_base().ok()).as_ref()
}

/// Exact counts under the `cl100k_base` vocabulary.
#[derive(Clone, Copy)]
pub struct TiktokenCounter {
    encoder: &'static CoreBPE,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter").finish_non_exhaustive()
    }
}

impl TiktokenCounter {
    pub fn new() -> Result<Self> {
        match cl100k() {
            Some(encoder) => Ok(Self { encoder }),
            None => bail!("failed to initialize tiktoken cl100k_base encoder"),
        }
    }
}

impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        "cl100k"
    }

    fn count(&self, text: &str) -> usize {
        self.encoder.encode_ordinary(text).len()
    }
}

/// Build the counter named in `[chunking].tokenizer`.
///
/// `"cl100k"` falls back to the character heuristic if the BPE tables cannot
/// be loaded.
pub fn create_counter(name: &str) -> Result<Arc<dyn TokenCounter>> {
    match name {
        "cl100k" => match TiktokenCounter::new() {
            Ok(counter) => Ok(Arc::new(counter)),
            Err(e) => {
                tracing::error!(error = %e, "falling back to character-based token estimates");
                Ok(Arc::new(CharEstimateCounter))
            }
        },
        "chars" => Ok(Arc::new(CharEstimateCounter)),
        other => bail!("Unknown tokenizer: '{}'. Must be cl100k or chars.", other),
    }
}
