//! `/users` account-management endpoints.

use axum::extract::{Path, State};
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::require_role;
use crate::auth::{Claims, Role};
use crate::error::{AppError, Result};
use crate::users::{CreateUser, User};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub id: String,
    pub username: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserBody {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            role: u.role,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserBody>> {
    require_role(&claims, Role::Admin)?;
    let role = Role::parse(&req.role)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown role `{}`", req.role)))?;
    let user = state
        .users
        .create(CreateUser {
            username: req.username,
            password: req.password,
            role,
        })
        .await?;
    Ok(Json(user.into()))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserBody>>> {
    require_role(&claims, Role::Admin)?;
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserBody::from).collect()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<()> {
    require_role(&claims, Role::Admin)?;
    state.users.delete(&username).await
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<()> {
    require_role(&claims, Role::Admin)?;
    state.users.reset_password(&req.username, &req.new_password).await
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Self-service: any authenticated user may change their own password.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<()> {
    state
        .users
        .change_password(&claims.username, &req.current_password, &req.new_password)
        .await
}
