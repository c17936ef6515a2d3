//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CatalogRepo, TagRepo, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + CatalogRepo + TagRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a SQLite store at `path` and migrate it.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers, so per-session transactions
            // never hit "database is locked" under request concurrency.
            .max_connections(1)
            // An in-memory database lives only as long as its connection.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "sqlite metadata store ready");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    const SELECT_SESSION: &str = "SELECT * FROM upload_sessions WHERE upload_id = ?";

    fn transition_error(from: &str, to: &str) -> MetadataError {
        MetadataError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn db_size(value: u64) -> MetadataResult<i64> {
        i64::try_from(value)
            .map_err(|_| MetadataError::Constraint(format!("size {value} exceeds storable range")))
    }

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO upload_sessions (
                    upload_id, storage_key, original_name, declared_size, received_bytes,
                    chunk_size, state, created_at, updated_at, completed_at,
                    error_code, error_detail
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.upload_id)
            .bind(&session.storage_key)
            .bind(&session.original_name)
            .bind(session.declared_size)
            .bind(session.received_bytes)
            .bind(session.chunk_size)
            .bind(&session.state)
            .bind(session.created_at)
            .bind(session.updated_at)
            .bind(session.completed_at)
            .bind(&session.error_code)
            .bind(&session.error_detail)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || {
                    format!(
                        "upload session {} or storage key {}",
                        session.upload_id, session.storage_key
                    )
                })
            })?;
            Ok(())
        }

        async fn get_session(&self, upload_id: Uuid) -> MetadataResult<Option<UploadSessionRow>> {
            let row = sqlx::query_as::<_, UploadSessionRow>(SELECT_SESSION)
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn pin_total_chunks(
            &self,
            upload_id: Uuid,
            total_chunks: u32,
        ) -> MetadataResult<Option<u32>> {
            let recorded: Option<Option<i64>> = sqlx::query_scalar(
                r#"
                UPDATE upload_sessions
                SET total_chunks = COALESCE(total_chunks, ?)
                WHERE upload_id = ?
                RETURNING total_chunks
                "#,
            )
            .bind(i64::from(total_chunks))
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;

            match recorded.flatten() {
                None => Ok(None),
                Some(value) => u32::try_from(value).map(Some).map_err(|_| {
                    MetadataError::Internal(format!("total_chunks {value} out of range"))
                }),
            }
        }

        async fn advance_session(
            &self,
            upload_id: Uuid,
            chunk_index: u32,
            size_bytes: u64,
            received_at: OffsetDateTime,
        ) -> MetadataResult<Option<UploadSessionRow>> {
            let size_bytes = db_size(size_bytes)?;
            let mut tx = self.pool.begin().await?;

            let Some(session) = sqlx::query_as::<_, UploadSessionRow>(SELECT_SESSION)
                .bind(upload_id)
                .fetch_optional(&mut *tx)
                .await?
            else {
                return Ok(None);
            };

            if session.state == "completed" || session.state == "failed" {
                tx.commit().await?;
                return Ok(Some(session));
            }

            sqlx::query(
                r#"
                INSERT INTO upload_chunks (upload_id, chunk_index, size_bytes, received_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (upload_id, chunk_index)
                DO UPDATE SET size_bytes = excluded.size_bytes, received_at = excluded.received_at
                "#,
            )
            .bind(upload_id)
            .bind(i64::from(chunk_index))
            .bind(size_bytes)
            .bind(received_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE upload_sessions
                SET received_bytes = (
                        SELECT COALESCE(SUM(size_bytes), 0) FROM upload_chunks WHERE upload_id = ?
                    ),
                    state = 'uploading',
                    updated_at = ?
                WHERE upload_id = ? AND state IN ('pending', 'uploading')
                "#,
            )
            .bind(upload_id)
            .bind(received_at)
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

            let updated = sqlx::query_as::<_, UploadSessionRow>(SELECT_SESSION)
                .bind(upload_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(Some(updated))
        }

        async fn finalize_session(
            &self,
            upload_id: Uuid,
            assembled_bytes: u64,
            completed_at: OffsetDateTime,
        ) -> MetadataResult<UploadSessionRow> {
            let assembled_bytes = db_size(assembled_bytes)?;
            let mut tx = self.pool.begin().await?;

            let mut session = sqlx::query_as::<_, UploadSessionRow>(SELECT_SESSION)
                .bind(upload_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("upload {upload_id}")))?;

            match session.state.as_str() {
                "completed" => {}
                "failed" => return Err(transition_error("failed", "completed")),
                _ => {
                    sqlx::query(
                        "UPDATE upload_sessions SET state = 'completed', received_bytes = ?, completed_at = ?, updated_at = ? WHERE upload_id = ?",
                    )
                    .bind(assembled_bytes)
                    .bind(completed_at)
                    .bind(completed_at)
                    .bind(upload_id)
                    .execute(&mut *tx)
                    .await?;

                    session.state = "completed".to_string();
                    session.received_bytes = assembled_bytes;
                    session.completed_at = Some(completed_at);
                    session.updated_at = completed_at;
                }
            }

            tx.commit().await?;
            Ok(session)
        }

        async fn fail_session(
            &self,
            upload_id: Uuid,
            error_code: &str,
            error_detail: Option<&str>,
            failed_at: OffsetDateTime,
        ) -> MetadataResult<UploadSessionRow> {
            let mut tx = self.pool.begin().await?;

            let mut session = sqlx::query_as::<_, UploadSessionRow>(SELECT_SESSION)
                .bind(upload_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("upload {upload_id}")))?;

            match session.state.as_str() {
                "failed" => {}
                "completed" => return Err(transition_error("completed", "failed")),
                _ => {
                    sqlx::query(
                        "UPDATE upload_sessions SET state = 'failed', error_code = ?, error_detail = ?, updated_at = ? WHERE upload_id = ?",
                    )
                    .bind(error_code)
                    .bind(error_detail)
                    .bind(failed_at)
                    .bind(upload_id)
                    .execute(&mut *tx)
                    .await?;

                    session.state = "failed".to_string();
                    session.error_code = Some(error_code.to_string());
                    session.error_detail = error_detail.map(str::to_string);
                    session.updated_at = failed_at;
                }
            }

            tx.commit().await?;
            Ok(session)
        }

        async fn get_received_chunks(
            &self,
            upload_id: Uuid,
        ) -> MetadataResult<Vec<UploadChunkRow>> {
            let rows = sqlx::query_as::<_, UploadChunkRow>(
                "SELECT * FROM upload_chunks WHERE upload_id = ? ORDER BY chunk_index",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_session(&self, upload_id: Uuid) -> MetadataResult<()> {
            // upload_chunks and file_tags rows go with it via ON DELETE CASCADE.
            let result = sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CatalogRepo for SqliteStore {
        async fn list_files(&self) -> MetadataResult<Vec<UploadSessionRow>> {
            let rows = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions ORDER BY created_at DESC, rowid DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn rename_file(
            &self,
            upload_id: Uuid,
            new_name: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<UploadSessionRow> {
            let result = sqlx::query(
                "UPDATE upload_sessions SET original_name = ?, updated_at = ? WHERE upload_id = ?",
            )
            .bind(new_name)
            .bind(updated_at)
            .bind(upload_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }

            self.get_session(upload_id)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("upload {upload_id}")))
        }
    }

    #[async_trait]
    impl TagRepo for SqliteStore {
        async fn create_tag(
            &self,
            name: &str,
            created_at: OffsetDateTime,
        ) -> MetadataResult<TagRow> {
            let row = sqlx::query_as::<_, TagRow>(
                "INSERT INTO tags (name, created_at) VALUES (?, ?) RETURNING *",
            )
            .bind(name)
            .bind(created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, || format!("tag '{name}'")))?;
            Ok(row)
        }

        async fn get_tag(&self, tag_id: i64) -> MetadataResult<Option<TagRow>> {
            let row = sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE tag_id = ?")
                .bind(tag_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_tags(&self) -> MetadataResult<Vec<TagRow>> {
            let rows = sqlx::query_as::<_, TagRow>("SELECT * FROM tags ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn delete_tag(&self, tag_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM tags WHERE tag_id = ?")
                .bind(tag_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("tag {tag_id}")));
            }
            Ok(())
        }

        async fn set_file_tags(
            &self,
            upload_id: Uuid,
            tag_ids: &[i64],
        ) -> MetadataResult<Vec<TagRow>> {
            let mut tx = self.pool.begin().await?;

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM upload_sessions WHERE upload_id = ?)",
            )
            .bind(upload_id)
            .fetch_one(&mut *tx)
            .await?;
            if !exists {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }

            sqlx::query("DELETE FROM file_tags WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;

            for tag_id in tag_ids {
                sqlx::query(
                    "INSERT OR IGNORE INTO file_tags (upload_id, tag_id) SELECT ?, tag_id FROM tags WHERE tag_id = ?",
                )
                .bind(upload_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            self.get_file_tags(upload_id).await
        }

        async fn get_file_tags(&self, upload_id: Uuid) -> MetadataResult<Vec<TagRow>> {
            let rows = sqlx::query_as::<_, TagRow>(
                r#"
                SELECT t.tag_id, t.name, t.created_at
                FROM tags t
                JOIN file_tags ft ON ft.tag_id = t.tag_id
                WHERE ft.upload_id = ?
                ORDER BY t.name
                "#,
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_file_tags(&self) -> MetadataResult<Vec<FileTagRow>> {
            let rows = sqlx::query_as::<_, FileTagRow>(
                r#"
                SELECT ft.upload_id, t.tag_id, t.name
                FROM file_tags ft
                JOIN tags t ON t.tag_id = ft.tag_id
                ORDER BY t.name
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Upload sessions: one row per initiated upload
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id BLOB PRIMARY KEY,
    storage_key TEXT NOT NULL UNIQUE,
    original_name TEXT NOT NULL,
    declared_size INTEGER NOT NULL,
    received_bytes INTEGER NOT NULL DEFAULT 0,
    chunk_size INTEGER NOT NULL,
    total_chunks INTEGER CHECK (total_chunks IS NULL OR total_chunks > 0),
    state TEXT NOT NULL DEFAULT 'pending'
        CHECK (state IN ('pending', 'uploading', 'completed', 'failed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    error_code TEXT,
    error_detail TEXT
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_created ON upload_sessions(created_at);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_state ON upload_sessions(state);

-- Latest persisted payload size per chunk index
CREATE TABLE IF NOT EXISTS upload_chunks (
    upload_id BLOB NOT NULL REFERENCES upload_sessions(upload_id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    received_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, chunk_index)
);

-- Tags and file associations
CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_tags (
    upload_id BLOB NOT NULL REFERENCES upload_sessions(upload_id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
    PRIMARY KEY (upload_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_file_tags_tag ON file_tags(tag_id);
"#;
