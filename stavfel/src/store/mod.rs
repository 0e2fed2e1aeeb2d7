//! Durable storage of overlay entries in PostgreSQL.
//!
//! One table, keyed on `(language, entry)`. Every mutation notifies the
//! `entry_update` channel inside the same transaction, so subscribers observe
//! changes to a given key in commit order.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use crate::checker::{EntryLevel, Phrase};

/// The notification channel that carries [`EntryUpdateNotification`]s.
pub const ENTRY_UPDATE_CHANNEL: &str = "entry_update";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("encode notification payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A persisted dictionary entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntryRow {
    pub language: String,
    pub entry: String,
    pub status: String,
    pub description: String,
    /// Mistake templates as authored; expansion happens in memory.
    pub common_mistakes: Vec<String>,
    pub level: String,
    pub data: Option<sqlx::types::Json<EntryData>>,
    pub updated: DateTime<Utc>,
    pub updated_by: String,
}

/// The free-form jsonb column of an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryData {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub forms: HashMap<String, String>,
}

impl EntryRow {
    /// Projects the row into the in-memory phrase shape.
    pub fn into_phrase(self) -> Phrase {
        Phrase {
            text: self.entry,
            description: self.description,
            common_mistakes: self.common_mistakes,
            level: EntryLevel::parse(&self.level),
            forms: self.data.map(|data| data.0.forms).unwrap_or_default(),
        }
    }
}

/// Payload of the `entry_update` channel.
///
/// Field names are part of the wire format shared with other instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdateNotification {
    #[serde(rename = "Language")]
    pub language: String,
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Deleted", default)]
    pub deleted: bool,
}

/// Filters and paging for [`EntryStore::list_entries`].
#[derive(Debug, Clone, Default)]
pub struct ListEntriesParams {
    pub language: Option<String>,
    /// SQL `LIKE` pattern matched against the entry text.
    pub pattern: Option<String>,
    pub status: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// One row of the [`EntryStore::list_dictionaries`] rollup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DictionaryCount {
    pub language: String,
    pub entries: i64,
}

const ENTRY_COLUMNS: &str =
    "language, entry, status, description, common_mistakes, level, data, updated, updated_by";

#[derive(Clone)]
pub struct EntryStore {
    pool: PgPool,
}

impl EntryStore {
    pub fn new(pool: PgPool) -> EntryStore {
        EntryStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;

        Ok(())
    }

    /// Upserts an entry and notifies `entry_update` in the same transaction.
    pub async fn set_entry(&self, row: &EntryRow) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO entry (language, entry, status, description, \
                                common_mistakes, level, data, updated, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (language, entry) DO UPDATE SET \
                 status = excluded.status, \
                 description = excluded.description, \
                 common_mistakes = excluded.common_mistakes, \
                 level = excluded.level, \
                 data = excluded.data, \
                 updated = excluded.updated, \
                 updated_by = excluded.updated_by",
        )
        .bind(&row.language)
        .bind(&row.entry)
        .bind(&row.status)
        .bind(&row.description)
        .bind(&row.common_mistakes)
        .bind(&row.level)
        .bind(&row.data)
        .bind(row.updated)
        .bind(&row.updated_by)
        .execute(&mut *tx)
        .await?;

        notify(
            &mut tx,
            ENTRY_UPDATE_CHANNEL,
            &EntryUpdateNotification {
                language: row.language.clone(),
                text: row.entry.clone(),
                deleted: false,
            },
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Deletes an entry and notifies `entry_update` in the same transaction.
    /// Deleting a nonexistent entry still notifies; appliers treat a missing
    /// row as a removal anyway.
    pub async fn delete_entry(&self, language: &str, text: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entry WHERE language = $1 AND entry = $2")
            .bind(language)
            .bind(text)
            .execute(&mut *tx)
            .await?;

        notify(
            &mut tx,
            ENTRY_UPDATE_CHANNEL,
            &EntryUpdateNotification {
                language: language.to_owned(),
                text: text.to_owned(),
                deleted: true,
            },
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn get_entry(&self, language: &str, text: &str) -> Result<EntryRow, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entry WHERE language = $1 AND entry = $2",
        ))
        .bind(language)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound)
    }

    /// Lists entries in primary-key order, optionally filtered.
    pub async fn list_entries(
        &self,
        params: &ListEntriesParams,
    ) -> Result<Vec<EntryRow>, StoreError> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entry \
             WHERE ($1::text IS NULL OR language = $1) \
               AND ($2::text IS NULL OR entry LIKE $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY language, entry \
             LIMIT $4 OFFSET $5",
        ))
        .bind(&params.language)
        .bind(&params.pattern)
        .bind(&params.status)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Entry counts per language, across all rows.
    pub async fn list_dictionaries(&self) -> Result<Vec<DictionaryCount>, StoreError> {
        let rows = sqlx::query_as::<_, DictionaryCount>(
            "SELECT language, count(*) AS entries FROM entry \
             GROUP BY language ORDER BY language",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Publishes a bare notification outside any entry transaction. Used for
    /// the listener's self-ping.
    pub async fn notify_raw(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

async fn notify<T: Serialize>(
    tx: &mut Transaction<'_, Postgres>,
    channel: &str,
    payload: &T,
) -> Result<(), StoreError> {
    let message = serde_json::to_string(payload)?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(message)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_wire_format() {
        let payload = EntryUpdateNotification {
            language: "sv-se".into(),
            text: "fly".into(),
            deleted: false,
        };

        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"Language":"sv-se","Text":"fly","Deleted":false}"#
        );

        // Deleted may be omitted by older senders.
        let parsed: EntryUpdateNotification =
            serde_json::from_str(r#"{"Language":"sv-se","Text":"fly"}"#).unwrap();
        assert!(!parsed.deleted);
    }

    #[test]
    fn row_projects_into_phrase() {
        let row = EntryRow {
            language: "sv-se".into(),
            entry: "Muammar Gaddafi".into(),
            status: "approved".into(),
            description: "libysk diktator".into(),
            common_mistakes: vec!["{Mohammar|Muammar} Khadaffi".into()],
            level: "suggestion".into(),
            data: Some(sqlx::types::Json(EntryData {
                forms: [("Gaddafis".to_string(), "Muammar Gaddafis".to_string())]
                    .into_iter()
                    .collect(),
            })),
            updated: Utc::now(),
            updated_by: "core".into(),
        };

        let phrase = row.into_phrase();
        assert_eq!(phrase.text, "Muammar Gaddafi");
        assert_eq!(phrase.level, EntryLevel::Suggestion);
        assert_eq!(phrase.common_mistakes.len(), 1);
        assert_eq!(
            phrase.forms.get("Gaddafis").map(String::as_str),
            Some("Muammar Gaddafis")
        );
    }

    #[test]
    fn unknown_level_defaults_to_error() {
        assert_eq!(EntryLevel::parse("unexpected"), EntryLevel::Error);
        assert_eq!(EntryLevel::parse("suggestion"), EntryLevel::Suggestion);
    }
}
