//! SQLite-backed store.
//!
//! Wraps a [`SqlitePool`] and maps each store operation onto a single
//! statement against the `events` and `contacts` tables created by
//! [`crate::migrate`]. A pool connection is checked out per statement and
//! returned when the statement completes or fails.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;

use super::{normalize, ContactStore, DedupKey, DedupStore};

/// SQLite implementation of [`DedupStore`] and [`ContactStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn seen(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool> {
        let key = DedupKey::new(user, raw_subject, sender);
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM events WHERE user_email = ? AND raw_subject = ? AND sender = ?",
        )
        .bind(&key.user)
        .bind(&key.raw_subject)
        .bind(&key.sender)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn record(&self, user: &str, raw_subject: &str, sender: &str) -> Result<bool> {
        let key = DedupKey::new(user, raw_subject, sender);
        // The UNIQUE constraint arbitrates between concurrent writers.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO events (user_email, raw_subject, sender) VALUES (?, ?, ?)",
        )
        .bind(&key.user)
        .bind(&key.raw_subject)
        .bind(&key.sender)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ContactStore for SqliteStore {
    async fn save(&self, user: &str, contact: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contacts (user_email, contact_email, frequency)
            VALUES (?, ?, 1)
            ON CONFLICT(user_email, contact_email)
            DO UPDATE SET frequency = frequency + 1
            "#,
        )
        .bind(normalize(user))
        .bind(normalize(contact))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn suggest(&self, user: &str, limit: Option<usize>) -> Result<Vec<String>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let contacts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT contact_email
            FROM contacts
            WHERE user_email = ?
            ORDER BY frequency DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(normalize(user))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }
}
