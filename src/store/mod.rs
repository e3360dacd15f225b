//! Persistence abstraction for dedup and contact records.
//!
//! Two narrow traits cover everything the pipeline persists:
//!
//! | Trait | Backs | Table |
//! |-------|-------|-------|
//! | [`DedupStore`] | at-most-once event delivery per user | `events` |
//! | [`ContactStore`] | participant frequency + suggestions | `contacts` |
//!
//! [`SqliteStore`] implements both against a shared [`sqlx::SqlitePool`];
//! [`InMemoryStore`] implements both behind locks for tests and ephemeral
//! runs. Implementations must be `Send + Sync` and serialize their own
//! writes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::EventRecord;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Normalized `(user, raw_subject, sender)` triple.
///
/// Every part is trimmed and lowercased so that casing and whitespace
/// variants of the same event collapse onto one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub user: String,
    pub raw_subject: String,
    pub sender: String,
}

impl DedupKey {
    pub fn new(user: &str, raw_subject: &str, sender: &str) -> Self {
        Self {
            user: normalize(user),
            raw_subject: normalize(raw_subject),
            sender: normalize(sender),
        }
    }
}

/// Trim and lowercase.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Records which events a user has already been shown.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// True iff the normalized key has been recorded for this user.
    async fn seen(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool>;

    /// Insert the normalized key, returning `true` only for the caller that
    /// actually inserted it. Recording an existing key is a no-op that
    /// returns `false`. Must be atomic across concurrent callers.
    async fn record(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool>;
}

/// Per-user contact frequency counts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Create the `(user, contact)` pair with frequency 1, or bump it.
    async fn save(&self, user: &str, contact: &str) -> Result<()>;

    /// Contacts ordered by descending frequency, optionally truncated.
    async fn suggest(&self, user: &str, limit: Option<usize>) -> Result<Vec<String>>;
}

/// Result of [`filter_new`].
///
/// `fresh` holds every event this call recorded, even when a later store
/// call failed: those events are already marked seen and would otherwise
/// never be delivered.
#[derive(Debug)]
pub struct FilterOutcome {
    pub fresh: Vec<EventRecord>,
    pub error: Option<Error>,
}

/// Keep only events this user has not seen before, recording each kept one.
///
/// [`DedupStore::record`] is the only gate, so two concurrent calls never
/// both keep the same event. Relative order of kept events is preserved, and
/// duplicates inside `events` itself are dropped too. Filtering stops at the
/// first store error.
pub async fn filter_new(
    store: &dyn DedupStore,
    user: &str,
    events: Vec<EventRecord>,
) -> FilterOutcome {
    let mut fresh = Vec::with_capacity(events.len());

    for event in events {
        match store.record(user, &event.raw_subject, &event.sender).await {
            Ok(true) => fresh.push(event),
            Ok(false) => tracing::debug!(
                user,
                raw_subject = %event.raw_subject,
                sender = %event.sender,
                "dropping duplicate event"
            ),
            Err(e) => {
                return FilterOutcome {
                    fresh,
                    error: Some(e),
                }
            }
        }
    }

    FilterOutcome { fresh, error: None }
}
