use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::database::DbPool;
use crate::domain::error::AppError;

use super::password::PasswordHasherService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
}

/// User credential storage backing `/auth/register` and `/auth/login`.
/// Kept separate from `ChatRepository` (C2) since users aren't part of the
/// session/message/file domain model §3 describes — grounded on
/// `database/repository.rs`'s table-bootstrap style.
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                full_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    pub async fn register(&self, email: &str, password: &str, full_name: Option<&str>) -> Result<AuthUser, AppError> {
        let existing = sqlx::query("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool.get_pool())
            .await?;

        if existing.is_some() {
            return Err(AppError::Validation(format!("email {email} already registered")));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let password_hash = PasswordHasherService::hash(password)?;

        sqlx::query("INSERT INTO users (id, email, password_hash, full_name) VALUES ($1, $2, $3, $4)")
            .bind(&id)
            .bind(email)
            .bind(&password_hash)
            .bind(full_name)
            .execute(self.pool.get_pool())
            .await?;

        Ok(AuthUser { id, email: email.to_string(), full_name: full_name.map(str::to_string) })
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthUser, AppError> {
        let row = sqlx::query("SELECT id, email, password_hash, full_name FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool.get_pool())
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let password_hash: String = row.get("password_hash");
        if !PasswordHasherService::verify(password, &password_hash)? {
            return Err(AppError::Unauthenticated);
        }

        Ok(AuthUser { id: row.get("id"), email: row.get("email"), full_name: row.get("full_name") })
    }
}
