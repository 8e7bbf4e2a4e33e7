//! Component 8 — Auth/Role Gate.
//!
//! `login`/`refresh`/`verify` plus the axum middleware that attaches
//! verified claims to a request's extensions and enforces role membership
//! (spec §4.10).

pub mod jwt;
pub mod middleware;
pub mod password;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::users::UserStore;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("forbidden")]
    Forbidden,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token signing failed: {0}")]
    Sign(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    ReadWrite,
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ReadWrite => "read-write",
            Role::ReadOnly => "read-only",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "read-write" => Some(Role::ReadWrite),
            "read-only" => Some(Role::ReadOnly),
            _ => None,
        }
    }

    /// `admin > read-write > read-only` (spec §4.10): a higher role
    /// satisfies any requirement a lower one would.
    fn rank(&self) -> u8 {
        match self {
            Role::ReadOnly => 0,
            Role::ReadWrite => 1,
            Role::Admin => 2,
        }
    }

    pub fn satisfies(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthGate {
    users: UserStore,
    jwt: jwt::JwtCodec,
}

impl AuthGate {
    pub fn new(users: UserStore, secret: &str, token_ttl: i64, refresh_ttl: i64) -> Self {
        Self {
            users,
            jwt: jwt::JwtCodec::new(secret, token_ttl, refresh_ttl),
        }
    }

    /// Verifies the password against the stored hash; a nonexistent user and
    /// a wrong password both return `InvalidCredentials` (spec §7 "no
    /// user-exists disclosure").
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .users
            .find_by_username(username)
            .await
            .map_err(|_| AuthError::InvalidCredentials)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let role = Role::parse(&user.role).ok_or(AuthError::InvalidCredentials)?;
        Ok(self.jwt.issue_pair(&user.id, &user.username, role)?)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.jwt.verify(refresh_token)?;
        let role = Role::parse(&claims.role).ok_or(AuthError::TokenInvalid)?;
        Ok(self.jwt.issue_pair(&claims.sub, &claims.username, role)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.jwt.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::users::{CreateUser, UserStore};

    async fn gate() -> (tempfile::TempDir, AuthGate) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(&dir.path().join("auth.db")).unwrap();
        let users = UserStore::new(db);
        users
            .create(CreateUser {
                username: "admin".to_string(),
                password: "admin".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        (dir, AuthGate::new(users, "test-secret", 900, 1_209_600))
    }

    #[tokio::test]
    async fn login_succeeds_with_correct_password() {
        let (_dir, gate) = gate().await;
        let pair = gate.login("admin", "admin").await.unwrap();
        let claims = gate.verify(&pair.access_token).unwrap();
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
    }

    #[tokio::test]
    async fn login_fails_with_wrong_password() {
        let (_dir, gate) = gate().await;
        let err = gate.login("admin", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_fails_identically_for_unknown_user() {
        let (_dir, gate) = gate().await;
        let err = gate.login("nobody", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn refresh_reissues_a_valid_pair() {
        let (_dir, gate) = gate().await;
        let pair = gate.login("admin", "admin").await.unwrap();
        let reissued = gate.refresh(&pair.refresh_token).await.unwrap();
        let claims = gate.verify(&reissued.access_token).unwrap();
        assert_eq!(claims.username, "admin");
    }

    #[test]
    fn role_hierarchy_is_admin_over_read_write_over_read_only() {
        assert!(Role::Admin.satisfies(Role::ReadOnly));
        assert!(Role::Admin.satisfies(Role::ReadWrite));
        assert!(Role::ReadWrite.satisfies(Role::ReadOnly));
        assert!(!Role::ReadOnly.satisfies(Role::ReadWrite));
    }
}
