//! LLM event extraction.
//!
//! Sends a rendered prompt through a [`ChatClient`], strips the markdown
//! fences models like to wrap JSON in, and validates the result against a
//! typed envelope. A reply that is not JSON, or whose shape does not match,
//! becomes [`Error::MalformedResponse`]; nothing is retried.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::llm::{ChatClient, ChatRequest};
use crate::models::{EventRecord, FreeTextEvent};
use crate::prompt::{EMAIL_SYSTEM_PROMPT, FREE_TEXT_SYSTEM_PROMPT};

#[derive(Deserialize)]
struct EmailEnvelope {
    #[serde(default)]
    events: Option<Vec<EventRecord>>,
}

#[derive(Deserialize)]
struct FreeTextEnvelope {
    events: Vec<FreeTextEvent>,
}

/// Remove ```` ```json ```` / ```` ``` ```` fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn parse_envelope<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(120).collect();
        Error::MalformedResponse(format!("{} (content: {:?})", e, preview))
    })
}

/// Parse an email-mode completion. A missing `events` key means no events.
pub fn parse_events(raw: &str) -> Result<Vec<EventRecord>> {
    let envelope: EmailEnvelope = parse_envelope(raw)?;
    Ok(envelope.events.unwrap_or_default())
}

/// Parse a free-text completion. Here `events` is required.
pub fn parse_free_text_events(raw: &str) -> Result<Vec<FreeTextEvent>> {
    let envelope: FreeTextEnvelope = parse_envelope(raw)?;
    Ok(envelope.events)
}

/// Run one email-mode prompt and return the extracted events.
pub async fn extract_events(client: &dyn ChatClient, prompt: &str) -> Result<Vec<EventRecord>> {
    let raw = client
        .complete(&ChatRequest::new(EMAIL_SYSTEM_PROMPT, prompt))
        .await?;
    parse_events(&raw)
}

/// Run one free-text prompt and return the extracted events.
pub async fn extract_free_text(
    client: &dyn ChatClient,
    prompt: &str,
) -> Result<Vec<FreeTextEvent>> {
    let raw = client
        .complete(&ChatRequest::new(FREE_TEXT_SYSTEM_PROMPT, prompt))
        .await?;
    parse_free_text_events(&raw)
}
