//! Token-budgeted block chunker.
//!
//! Packs [`TextBlock`]s into [`Chunk`]s whose token estimate stays within a
//! configurable budget, so each chunk fits in one LLM request.
//!
//! # Algorithm
//!
//! 1. Count the tokens of every block with the injected [`TokenCounter`].
//! 2. Append blocks to a running buffer, separated by a blank line, until the
//!    next block would push the buffer total past the budget; then flush the
//!    buffer as a chunk and start a new one with that block.
//! 3. A block that on its own exceeds the budget is split on `". "` and its
//!    sentences are packed greedily into chunks of their own. The running
//!    buffer is left alone and resumes after the oversized block.
//! 4. Flush whatever remains.
//!
//! The budget covers block content; the `\n\n` separators are not counted.
//! A single sentence longer than the budget is emitted as-is.
//!
//! # Example
//!
//! ```rust
//! use event_harvester::chunk::chunk_blocks;
//! use event_harvester::models::TextBlock;
//! use event_harvester::tokens::CharEstimateCounter;
//!
//! let blocks = vec![TextBlock("Subject: lunch".into()), TextBlock("Subject: standup".into())];
//! let chunks = chunk_blocks(&blocks, 4000, &CharEstimateCounter);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Subject: lunch\n\nSubject: standup");
//! ```

use crate::models::{Chunk, TextBlock};
use crate::tokens::TokenCounter;

/// Default token budget per chunk.
pub const DEFAULT_MAX_TOKENS: usize = 4000;

const SENTENCE_DELIMITER: &str = ". ";
const BLOCK_SEPARATOR: &str = "\n\n";

/// Split `blocks` into chunks of at most `max_tokens` estimated tokens.
///
/// Returns chunks with contiguous indices starting at 0. Empty input yields
/// no chunks.
pub fn chunk_blocks(
    blocks: &[TextBlock],
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let mut out = ChunkSink::default();
    let mut current_buf = String::new();
    let mut current_tokens = 0usize;

    for block in blocks {
        let block_tokens = counter.count(block.as_str());

        if block_tokens > max_tokens {
            split_oversized(block.as_str(), max_tokens, counter, &mut out);
            continue;
        }

        if current_tokens + block_tokens > max_tokens {
            out.push(&current_buf, current_tokens);
            current_buf.clear();
            current_tokens = 0;
        }

        current_buf.push_str(block.as_str());
        current_buf.push_str(BLOCK_SEPARATOR);
        current_tokens += block_tokens;
    }

    out.push(&current_buf, current_tokens);
    out.chunks
}

/// Pack the sentences of one oversized block into their own chunks.
fn split_oversized(
    block: &str,
    max_tokens: usize,
    counter: &dyn TokenCounter,
    out: &mut ChunkSink,
) {
    let mut buf = String::new();

    for sentence in block.split_inclusive(SENTENCE_DELIMITER) {
        let candidate = format!("{}{}", buf, sentence);
        if counter.count(&candidate) > max_tokens {
            let tokens = counter.count(&buf);
            out.push(&buf, tokens);
            buf = sentence.to_string();
        } else {
            buf = candidate;
        }
    }

    let tokens = counter.count(&buf);
    out.push(&buf, tokens);
}

#[derive(Default)]
struct ChunkSink {
    chunks: Vec<Chunk>,
}

impl ChunkSink {
    /// Append a trimmed chunk; whitespace-only text is dropped.
    fn push(&mut self, text: &str, tokens: usize) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            text: trimmed.to_string(),
            tokens,
        });
    }
}
