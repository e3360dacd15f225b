//! Concurrent per-chunk extraction with streamed progress.
//!
//! [`Dispatcher::process`] turns a list of chunks into a lazy stream of
//! [`ProgressRecord`]s:
//!
//! ```text
//!  chunks ──▶ prompt ──▶ extract (≤ N in flight) ──▶ completion order
//!                                                        │
//!                              filter_new + all_events ◀─┘  (single writer)
//!                                        │
//!                                        ▼
//!                 {chunk_index, ...} per chunk … {complete: true} last
//! ```
//!
//! Extraction calls run concurrently through `buffer_unordered`, so results
//! arrive in completion order rather than submission order. Deduplication and
//! the `all_events` accumulator are only touched by the task polling the
//! stream, one result at a time. A failed chunk yields a record with `error`
//! and never cancels its siblings. The terminal `complete` record is emitted
//! exactly once, after every chunk has settled.

use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::Result;
use crate::extract::extract_events;
use crate::llm::ChatClient;
use crate::models::{Chunk, EventRecord, ProgressRecord};
use crate::prompt::{build_email_prompt, PromptContext};
use crate::store::{filter_new, DedupStore};

/// Fans chunks out to the LLM and folds results back into progress records.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn ChatClient>,
    dedup: Arc<dyn DedupStore>,
    max_concurrency: usize,
}

type ChunkOutcome = (usize, Result<Vec<EventRecord>>);

struct DispatchState {
    inflight: BoxStream<'static, ChunkOutcome>,
    dedup: Arc<dyn DedupStore>,
    user: String,
    total_chunks: usize,
    all_events: Vec<EventRecord>,
    finished: bool,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn ChatClient>,
        dedup: Arc<dyn DedupStore>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            dedup,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Process `chunks` for `user`, yielding one record per completed chunk
    /// that produced new events or failed, then a final `complete` record.
    ///
    /// Nothing runs until the returned stream is polled.
    pub fn process(
        &self,
        chunks: Vec<Chunk>,
        user: impl Into<String>,
        ctx: PromptContext,
    ) -> impl Stream<Item = ProgressRecord> + Send + 'static {
        let total_chunks = chunks.len();
        let client = self.client.clone();

        let inflight = stream::iter(chunks)
            .map(move |chunk| {
                let client = client.clone();
                let prompt = build_email_prompt(&chunk.text, &ctx);
                async move {
                    tracing::debug!(
                        chunk_index = chunk.index,
                        tokens = chunk.tokens,
                        model = client.model_name(),
                        "dispatching chunk"
                    );
                    let outcome = extract_events(client.as_ref(), &prompt).await;
                    (chunk.index, outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .boxed();

        let state = DispatchState {
            inflight,
            dedup: self.dedup.clone(),
            user: user.into(),
            total_chunks,
            all_events: Vec::new(),
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            let record = state.next_record().await;
            Some((record, state))
        })
    }
}

impl DispatchState {
    /// Drive in-flight calls until one produces a record worth emitting.
    async fn next_record(&mut self) -> ProgressRecord {
        while let Some((chunk_index, outcome)) = self.inflight.next().await {
            let events = match outcome {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(chunk_index, error = %e, "chunk extraction failed");
                    return self.failed(chunk_index, e.to_string());
                }
            };

            let extracted = events.len();
            let outcome = filter_new(self.dedup.as_ref(), &self.user, events).await;
            let fresh = outcome.fresh;
            self.all_events.extend(fresh.iter().cloned());

            if let Some(e) = outcome.error {
                // Events recorded before the failure are already marked seen.
                tracing::warn!(chunk_index, kept = fresh.len(), error = %e, "dedup failed");
                return ProgressRecord::failed(
                    chunk_index,
                    self.total_chunks,
                    e.to_string(),
                    fresh,
                    self.all_events.clone(),
                );
            }

            tracing::info!(
                chunk_index,
                total_chunks = self.total_chunks,
                extracted,
                new = fresh.len(),
                "chunk complete"
            );

            if fresh.is_empty() {
                continue;
            }

            return ProgressRecord::chunk(
                chunk_index,
                self.total_chunks,
                fresh,
                self.all_events.clone(),
            );
        }

        self.finished = true;
        tracing::info!(
            total_chunks = self.total_chunks,
            events = self.all_events.len(),
            "all chunks settled"
        );
        ProgressRecord::complete(self.total_chunks, self.all_events.clone())
    }

    fn failed(&self, chunk_index: usize, error: String) -> ProgressRecord {
        ProgressRecord::failed(
            chunk_index,
            self.total_chunks,
            error,
            Vec::new(),
            self.all_events.clone(),
        )
    }
}
