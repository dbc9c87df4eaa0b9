//! SQLite message store.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use postrider_imap::{
    CacheEntry, CacheError, CachedSummary, Flag, Flags, Have, MessageCache, MessagePart, Uid,
    UidValidity,
};

/// Durable message cache on a SQLite database.
///
/// One row per `(folder, uid)`, holding flags as text and the two
/// message parts as nullable blobs, plus one row per folder for its
/// UIDVALIDITY stamp. All writes are upserts; the engine's merge
/// semantics (bytes replace their part, absent parts stay, flags
/// always replace) map onto `ON CONFLICT` with `COALESCE`.
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn open(database_path: &str) -> Result<Self, CacheError> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(db_error)?;
        let store = Self { pool };
        store.initialize().await?;
        tracing::info!(path = database_path, "cache store opened");
        Ok(store)
    }

    /// An in-memory store, for tests and throwaway sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), CacheError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                name TEXT PRIMARY KEY,
                uid_validity INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder TEXT NOT NULL,
                uid INTEGER NOT NULL,
                flags TEXT NOT NULL DEFAULT '',
                header BLOB,
                body BLOB,
                cached_at TEXT NOT NULL,
                UNIQUE(folder, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_folder
            ON messages(folder)
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    /// Drops a folder's rows and its stamp. For cache-management UI;
    /// the engine itself clears through
    /// [`set_uid_validity`](MessageCache::set_uid_validity).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_folder(&self, folder: &str) -> Result<(), CacheError> {
        sqlx::query(r"DELETE FROM messages WHERE folder = ?")
            .bind(folder)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        sqlx::query(r"DELETE FROM folders WHERE name = ?")
            .bind(folder)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

impl MessageCache for CacheStore {
    async fn uid_validity(&self, folder: &str) -> Result<Option<UidValidity>, CacheError> {
        let row = sqlx::query(r"SELECT uid_validity FROM folders WHERE name = ?")
            .bind(folder)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.and_then(|row| UidValidity::new(row.get::<u32, _>("uid_validity"))))
    }

    async fn set_uid_validity(
        &mut self,
        folder: &str,
        validity: UidValidity,
    ) -> Result<(), CacheError> {
        let stored = self.uid_validity(folder).await?;
        if stored.is_some_and(|v| v != validity) {
            tracing::info!(folder, "UIDVALIDITY changed; dropping cached rows");
            sqlx::query(r"DELETE FROM messages WHERE folder = ?")
                .bind(folder)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        sqlx::query(
            r"
            INSERT INTO folders (name, uid_validity) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET uid_validity = excluded.uid_validity
            ",
        )
        .bind(folder)
        .bind(validity.get())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn known(&self, folder: &str) -> Result<Vec<CachedSummary>, CacheError> {
        let rows = sqlx::query(
            r"
            SELECT uid, flags,
                   header IS NOT NULL AS has_header,
                   body IS NOT NULL AS has_body
            FROM messages
            WHERE folder = ?
            ORDER BY uid ASC
            ",
        )
        .bind(folder)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let summaries = rows
            .iter()
            .filter_map(|row| {
                let uid = Uid::new(row.get::<u32, _>("uid"))?;
                let flags: String = row.get("flags");
                Some(CachedSummary {
                    uid,
                    flags: flags_from_column(&flags),
                    have: Have {
                        header: row.get::<bool, _>("has_header"),
                        body: row.get::<bool, _>("has_body"),
                    },
                })
            })
            .collect();
        Ok(summaries)
    }

    async fn get(
        &self,
        folder: &str,
        uid: Uid,
        part: MessagePart,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let column = match part {
            MessagePart::Header => "header",
            MessagePart::Body => "body",
        };
        let query = format!("SELECT {column} FROM messages WHERE folder = ? AND uid = ?");
        let row = sqlx::query(&query)
            .bind(folder)
            .bind(uid.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.and_then(|row| row.get::<Option<Vec<u8>>, _>(column)))
    }

    async fn put(&mut self, folder: &str, uid: Uid, entry: CacheEntry) -> Result<(), CacheError> {
        sqlx::query(
            r"
            INSERT INTO messages (folder, uid, flags, header, body, cached_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(folder, uid) DO UPDATE SET
                flags = excluded.flags,
                header = COALESCE(excluded.header, header),
                body = COALESCE(excluded.body, body),
                cached_at = excluded.cached_at
            ",
        )
        .bind(folder)
        .bind(uid.get())
        .bind(flags_to_column(&entry.flags))
        .bind(entry.header)
        .bind(entry.body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_flags(
        &mut self,
        folder: &str,
        uid: Uid,
        flags: &Flags,
    ) -> Result<(), CacheError> {
        sqlx::query(r"UPDATE messages SET flags = ? WHERE folder = ? AND uid = ?")
            .bind(flags_to_column(flags))
            .bind(folder)
            .bind(uid.get())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete(&mut self, folder: &str, uid: Uid) -> Result<(), CacheError> {
        sqlx::query(r"DELETE FROM messages WHERE folder = ? AND uid = ?")
            .bind(folder)
            .bind(uid.get())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn folders(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(
            r"
            SELECT name FROM folders
            UNION
            SELECT folder FROM messages
            ORDER BY name
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }
}

fn db_error(err: sqlx::Error) -> CacheError {
    CacheError::new(err.to_string())
}

/// Flags column format: the wire atoms, space separated.
fn flags_to_column(flags: &Flags) -> String {
    flags
        .iter()
        .map(Flag::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

fn flags_from_column(column: &str) -> Flags {
    column.split_whitespace().map(Flag::parse).collect()
}
