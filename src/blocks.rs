//! Email record → text block rendering.

use crate::models::{EmailRecord, TextBlock};

const DEFAULT_SUBJECT: &str = "No subject";
const DEFAULT_SENDER: &str = "Unknown sender";

/// Render each record as one block, in input order.
pub fn build_blocks(records: &[EmailRecord]) -> Vec<TextBlock> {
    records.iter().map(build_block).collect()
}

fn build_block(record: &EmailRecord) -> TextBlock {
    let subject = record.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);
    let sender = record.sender.as_deref().unwrap_or(DEFAULT_SENDER);
    let snippet = clean_snippet(record.snippet.as_deref().unwrap_or(""));
    let thread = record.thread_id.as_deref().unwrap_or("");

    TextBlock(format!(
        "gmailThread: {}\nFrom: {}\nSubject: {}\nSnippet: {}",
        thread, sender, subject, snippet
    ))
}

/// Gmail snippets carry NBSPs, zero-width non-joiners and stray BOMs.
fn clean_snippet(snippet: &str) -> String {
    snippet
        .replace('\u{00a0}', " ")
        .replace(['\u{200c}', '\u{feff}'], "")
        .trim()
        .to_string()
}
