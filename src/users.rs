//! User accounts and role assignment backing the Auth/Role Gate, plus the
//! bootstrap-admin-on-empty-store logic spec §4.10 requires.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password;
use crate::auth::Role;
use crate::db::Db;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Creates the configured admin account if the `users` table is empty
    /// (spec §4.10 "bootstrap"); a no-op once any user exists.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<()> {
        let count: i64 = self
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .await?;
        if count > 0 {
            return Ok(());
        }
        self.create(CreateUser {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Admin,
        })
        .await?;
        Ok(())
    }

    pub async fn create(&self, input: CreateUser) -> Result<User> {
        let hash = password::hash(&input.password).map_err(AppError::from)?;
        let now = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        let role = input.role.as_str().to_string();
        let username = input.username.clone();

        self.db
            .with_conn({
                let id = id.clone();
                let username = username.clone();
                let hash = hash.clone();
                let role = role.clone();
                let now = now.clone();
                move |conn| {
                    conn.execute(
                        "INSERT INTO users (id, username, password_hash, role, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![id, username, hash, role, now],
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::SqliteFailure(err, _)
                            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                        {
                            AppError::Conflict(format!("username `{username}` already exists"))
                        }
                        other => AppError::from(other),
                    })?;
                    Ok(())
                }
            })
            .await?;

        Ok(User {
            id,
            username,
            password_hash: hash,
            role,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, username, password_hash, role, created_at, updated_at
                     FROM users WHERE username = ?1",
                    params![username],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password_hash: row.get(2)?,
                            role: row.get(3)?,
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .optional()
                .map_err(AppError::from)
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, username, password_hash, role, created_at, updated_at
                     FROM users ORDER BY username",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(User {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password_hash: row.get(2)?,
                            role: row.get(3)?,
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, username: &str) -> Result<()> {
        let username = username.to_string();
        let affected = self
            .db
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM users WHERE username = ?1", params![username])?)
            })
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("user `{username}`")));
        }
        Ok(())
    }

    /// Sets a new password for `username` regardless of the current one
    /// (the admin-only `/users/reset-password` endpoint, spec §6).
    pub async fn reset_password(&self, username: &str, new_password: &str) -> Result<()> {
        let hash = password::hash(new_password).map_err(AppError::from)?;
        let username = username.to_string();
        let now = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let affected = self
            .db
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE username = ?3",
                    params![hash, now, username],
                )?)
            })
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("user `{username}`")));
        }
        Ok(())
    }

    /// Changes a user's own password after verifying the current one (the
    /// self-service `/users/change-password` endpoint, spec §6).
    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user `{username}`")))?;
        if !password::verify(current_password, &user.password_hash).map_err(AppError::from)? {
            return Err(AppError::Unauthenticated);
        }
        self.reset_password(username, new_password).await
    }
}
