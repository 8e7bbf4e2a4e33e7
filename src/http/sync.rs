//! `/sync/pull` and `/sync/push`.

use axum::extract::State;
use axum::response::Json;
use axum::Extension;

use crate::auth::middleware::require_role;
use crate::auth::{Claims, Role};
use crate::error::Result;
use crate::sync::{PullRequest, PullResponse, PushRequest, PushResponse};

use super::state::AppState;

pub async fn pull(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponse>> {
    require_role(&claims, Role::ReadOnly)?;
    Ok(Json(state.sync.pull(req).await?))
}

pub async fn push(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    require_role(&claims, Role::ReadWrite)?;
    Ok(Json(state.sync.push(req).await?))
}
