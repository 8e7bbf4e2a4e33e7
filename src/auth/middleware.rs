//! Bearer-token extraction and role gating, wired into the router with
//! `axum::middleware::from_fn_with_state` the way the teacher's dashboard
//! API attaches request-scoped context (spec §4.10 "Middleware contract").

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::{AuthGate, Claims, Role};
use crate::error::AppError;

/// Verifies the bearer token and attaches `Claims` to the request's
/// extensions. Handlers that don't need a specific role just extract
/// `Extension<Claims>`; role-gated handlers additionally call
/// [`require_role`].
pub async fn authenticate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let claims = gate.verify(token).map_err(AppError::from)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Checks that the request's claims satisfy `required`; call after
/// `authenticate` has populated extensions, inside handlers that need a
/// role beyond "any authenticated user".
pub fn require_role(claims: &Claims, required: Role) -> Result<(), AppError> {
    let role = Role::parse(&claims.role).ok_or(AppError::Forbidden)?;
    if role.satisfies(required) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
