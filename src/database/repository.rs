use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::domain::error::AppError;
use crate::domain::models::{FileDocument, FileId, FileSection, FileStatus, Message, Role, Session};
use crate::domain::ports::ChatRepository;

use super::pool::DbPool;

/// SQL adapter for C2. Single-writer per session is achieved by taking a
/// row lock on the session row (`SELECT ... FOR UPDATE`) before assigning
/// the next message index — the dense, strictly-increasing `index`
/// invariant of §3 falls out of that lock.
pub struct PgChatRepository {
    pool: DbPool,
}

impl PgChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates the schema and supporting indexes if they don't already
    /// exist. Called once at boot, mirroring
    /// `docs/POC-AwareQuestion/repository_extended.rs::ensure_indices`.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_sessions (
                sid TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_messages (
                sid TEXT NOT NULL REFERENCES chat_sessions(sid) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                idx BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (sid, idx)
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_files (
                fid BIGSERIAL PRIMARY KEY,
                filename TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL,
                total_chunks BIGINT NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_messages_sid ON chat_messages (sid, idx)")
            .execute(self.pool.get_pool())
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_file_sections (
                fid BIGINT NOT NULL REFERENCES chat_files(fid) ON DELETE CASCADE,
                section_index BIGINT NOT NULL,
                page_start INT,
                page_end INT,
                text TEXT NOT NULL,
                PRIMARY KEY (fid, section_index)
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        sid: row.get("sid"),
        owner: row.get("owner"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_file(row: &sqlx::postgres::PgRow) -> FileDocument {
    let status_str: String = row.get("status");
    FileDocument {
        fid: row.get("fid"),
        filename: row.get("filename"),
        path: row.get("path"),
        status: FileStatus::from_str(&status_str).unwrap_or(FileStatus::Error),
        total_chunks: row.get("total_chunks"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create_session(&self, owner: &str, title: &str) -> Result<Session, AppError> {
        let sid = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO chat_sessions (sid, owner, title, created_at, updated_at) VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(&sid)
        .bind(owner)
        .bind(title)
        .bind(now)
        .execute(self.pool.get_pool())
        .await?;

        Ok(Session {
            sid,
            owner: owner.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_session(&self, sid: &str) -> Result<Session, AppError> {
        let row = sqlx::query("SELECT sid, owner, title, created_at, updated_at FROM chat_sessions WHERE sid = $1")
            .bind(sid)
            .fetch_optional(self.pool.get_pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {sid}")))?;

        Ok(row_to_session(&row))
    }

    async fn delete_session(&self, sid: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE sid = $1")
            .bind(sid)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_message(&self, sid: &str, role: Role, content: &str) -> Result<Message, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let locked = sqlx::query("SELECT sid FROM chat_sessions WHERE sid = $1 FOR UPDATE")
            .bind(sid)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("session {sid}")));
        }

        let next_index: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(idx), -1) + 1 FROM chat_messages WHERE sid = $1")
            .bind(sid)
            .fetch_one(&mut *tx)
            .await?;

        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO chat_messages (sid, role, content, idx, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(sid)
        .bind(role.as_str())
        .bind(content)
        .bind(next_index)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = $1 WHERE sid = $2")
            .bind(created_at)
            .bind(sid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(sid, index = next_index, "message appended");

        Ok(Message {
            sid: sid.to_string(),
            role,
            content: content.to_string(),
            index: next_index,
            created_at,
        })
    }

    async fn list_messages(&self, sid: &str) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query("SELECT sid, role, content, idx, created_at FROM chat_messages WHERE sid = $1 ORDER BY idx ASC")
            .bind(sid)
            .fetch_all(self.pool.get_pool())
            .await?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = match role_str.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    _ => Role::System,
                };
                Message {
                    sid: row.get("sid"),
                    role,
                    content: row.get("content"),
                    index: row.get("idx"),
                    created_at: row.get("created_at"),
                }
            })
            .collect();

        Ok(messages)
    }

    async fn create_file(&self, filename: &str, path: &str) -> Result<FileDocument, AppError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"INSERT INTO chat_files (filename, path, status, total_chunks, created_at, updated_at)
               VALUES ($1, $2, 'pending', 0, $3, $3)
               RETURNING fid, filename, path, status, total_chunks, error_message, created_at, updated_at"#,
        )
        .bind(filename)
        .bind(path)
        .bind(now)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(row_to_file(&row))
    }

    async fn list_files(&self) -> Result<Vec<FileDocument>, AppError> {
        let rows = sqlx::query(
            "SELECT fid, filename, path, status, total_chunks, error_message, created_at, updated_at FROM chat_files ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.iter().map(row_to_file).collect())
    }

    async fn get_file(&self, fid: FileId) -> Result<FileDocument, AppError> {
        let row = sqlx::query(
            "SELECT fid, filename, path, status, total_chunks, error_message, created_at, updated_at FROM chat_files WHERE fid = $1",
        )
        .bind(fid)
        .fetch_optional(self.pool.get_pool())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {fid}")))?;

        Ok(row_to_file(&row))
    }

    async fn update_file_status(
        &self,
        fid: FileId,
        status: &str,
        error: Option<&str>,
        total_chunks: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"UPDATE chat_files
               SET status = $2,
                   error_message = $3,
                   total_chunks = COALESCE($4, total_chunks),
                   updated_at = now()
               WHERE fid = $1"#,
        )
        .bind(fid)
        .bind(status)
        .bind(error)
        .bind(total_chunks)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn list_sections(&self, fid: FileId) -> Result<Vec<FileSection>, AppError> {
        let rows = sqlx::query(
            "SELECT fid, section_index, page_start, page_end, text FROM chat_file_sections \
             WHERE fid = $1 ORDER BY section_index ASC",
        )
        .bind(fid)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let page_start: Option<i32> = row.get("page_start");
                let page_end: Option<i32> = row.get("page_end");
                FileSection {
                    fid: row.get("fid"),
                    section_index: row.get("section_index"),
                    page_range: page_start.zip(page_end),
                    text: row.get("text"),
                }
            })
            .collect())
    }
}

impl PgChatRepository {
    /// Persists sections produced by the external PDF-extraction
    /// collaborator (§1's out-of-scope boundary). Called once per file
    /// after extraction completes, before the indexing pipeline runs.
    pub async fn insert_sections(&self, fid: FileId, sections: &[FileSection]) -> Result<(), AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        for section in sections {
            let (page_start, page_end) = match section.page_range {
                Some((s, e)) => (Some(s), Some(e)),
                None => (None, None),
            };

            sqlx::query(
                r#"INSERT INTO chat_file_sections (fid, section_index, page_start, page_end, text)
                   VALUES ($1, $2, $3, $4, $5)
                   ON CONFLICT (fid, section_index) DO UPDATE SET
                     page_start = EXCLUDED.page_start,
                     page_end = EXCLUDED.page_end,
                     text = EXCLUDED.text"#,
            )
            .bind(fid)
            .bind(section.section_index)
            .bind(page_start)
            .bind(page_end)
            .bind(&section.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
