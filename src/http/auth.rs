//! `/auth/login` and `/auth/refresh`.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;

use crate::auth::TokenPair;
use crate::error::Result;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    let pair = state.auth.login(&req.username, &req.password).await?;
    Ok(Json(pair))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(pair))
}
