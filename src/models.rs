//! Core data models used throughout the extraction pipeline.
//!
//! Wire names follow the browser extension's contract (`event`,
//! `raw_subject`, `gmailThread`); serde aliases accept the camel-case and
//! `title`/`threadId` spellings as well.

use serde::{Deserialize, Serialize};

/// One scraped email row, as posted by the extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default, rename = "gmailThread", alias = "threadId", alias = "thread_id")]
    pub thread_id: Option<String>,
}

/// Envelope for the `text` field of a `/parse` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailBatch {
    #[serde(default)]
    pub emails: Vec<EmailRecord>,
}

/// Flat text rendering of one [`EmailRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock(pub String);

impl TextBlock {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A bounded group of blocks sent to the LLM as one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the chunk list, starting at 0.
    pub index: usize,
    /// Blank-line-joined block text, trimmed.
    pub text: String,
    /// Token estimate of `text` under the counter that built it.
    pub tokens: usize,
}

/// Coarse priority bucket assigned by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    #[default]
    Low,
}

/// When an event happens, in machine and human form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    /// ISO-8601 instant, `start/end` interval, bare date, or `"Not specified"`.
    #[serde(default)]
    pub iso: String,
    #[serde(default)]
    pub display: String,
}

/// A calendar-worthy event extracted from email text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "event", alias = "title")]
    pub title: String,
    #[serde(alias = "rawSubject")]
    pub raw_subject: String,
    #[serde(default)]
    pub time: EventTime,
    #[serde(default)]
    pub context: String,
    pub sender: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default, rename = "gmailThread", alias = "threadId", alias = "thread_id")]
    pub thread_id: String,
}

/// An event extracted from free text typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTextEvent {
    #[serde(alias = "event")]
    pub title: String,
    #[serde(default)]
    pub time: EventTime,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// One NDJSON line streamed back from `/parse`.
///
/// Per-chunk records carry `chunk_index`; the terminal record carries
/// `complete: true` instead. `error` is present only for failed chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub complete: bool,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub new_events: Vec<EventRecord>,
    pub all_events: Vec<EventRecord>,
}

impl ProgressRecord {
    pub fn chunk(
        chunk_index: usize,
        total_chunks: usize,
        new_events: Vec<EventRecord>,
        all_events: Vec<EventRecord>,
    ) -> Self {
        Self {
            chunk_index: Some(chunk_index),
            complete: false,
            total_chunks,
            error: None,
            new_events,
            all_events,
        }
    }

    /// A failed chunk. `new_events` is non-empty only when dedup failed after
    /// some events were already recorded.
    pub fn failed(
        chunk_index: usize,
        total_chunks: usize,
        error: String,
        new_events: Vec<EventRecord>,
        all_events: Vec<EventRecord>,
    ) -> Self {
        Self {
            chunk_index: Some(chunk_index),
            complete: false,
            total_chunks,
            error: Some(error),
            new_events,
            all_events,
        }
    }

    pub fn complete(total_chunks: usize, all_events: Vec<EventRecord>) -> Self {
        Self {
            chunk_index: None,
            complete: true,
            total_chunks,
            error: None,
            new_events: Vec::new(),
            all_events,
        }
    }

    /// Serialize as a single NDJSON line (trailing `\n` included).
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":"failed to encode progress record: {}"}}"#, e)
        });
        line.push('\n');
        line
    }
}
