//! In-memory store for tests and ephemeral runs.
//!
//! Keys live in a `HashSet` and contacts in an insertion-ordered `Vec`, each
//! behind a `tokio::sync::RwLock`. Nothing survives the process.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

use super::{normalize, ContactStore, DedupKey, DedupStore};

struct StoredContact {
    user: String,
    contact: String,
    frequency: u64,
}

/// In-memory [`DedupStore`] + [`ContactStore`].
pub struct InMemoryStore {
    seen: RwLock<HashSet<DedupKey>>,
    contacts: RwLock<Vec<StoredContact>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
            contacts: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupStore for InMemoryStore {
    async fn seen(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool> {
        let key = DedupKey::new(user, raw_subject, sender);
        Ok(self.seen.read().await.contains(&key))
    }

    async fn record(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool> {
        let key = DedupKey::new(user, raw_subject, sender);
        Ok(self.seen.write().await.insert(key))
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn save(&self, user: &str, contact: &str) -> Result<()> {
        let user = normalize(user);
        let contact = normalize(contact);
        let mut contacts = self.contacts.write().await;

        match contacts
            .iter_mut()
            .find(|c| c.user == user && c.contact == contact)
        {
            Some(existing) => existing.frequency += 1,
            None => contacts.push(StoredContact {
                user,
                contact,
                frequency: 1,
            }),
        }
        Ok(())
    }

    async fn suggest(&self, user: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let user = normalize(user);
        let contacts = self.contacts.read().await;

        let mut mine: Vec<&StoredContact> = contacts.iter().filter(|c| c.user == user).collect();
        // Stable sort: ties keep insertion order.
        mine.sort_by(|a, b| b.frequency.cmp(&a.frequency));

        Ok(mine
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|c| c.contact.clone())
            .collect())
    }
}
