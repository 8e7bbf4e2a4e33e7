//! HTTP surface: router assembly over the component services, mirroring the
//! teacher's `packages/api-server` layering (state + route table + auth
//! middleware) but generalized to this crate's endpoints (spec §6).

pub mod attachments;
pub mod auth;
pub mod bundle;
pub mod health;
pub mod state;
pub mod sync;
pub mod users;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    // Every endpoint except `/health` and `/auth/login` requires a bearer
    // token (spec §6), `/auth/refresh` included — a caller refreshes with a
    // still-valid access token plus a refresh token in the body.
    let authenticated = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/version", get(health::version))
        .route("/sync/pull", post(sync::pull))
        .route("/sync/push", post(sync::push))
        .route("/app-bundle/manifest", get(bundle::manifest))
        .route("/app-bundle/download/*path", get(bundle::download))
        .route("/app-bundle/versions", get(bundle::list_versions))
        .route("/app-bundle/changes", get(bundle::changes))
        .route("/app-bundle/push", post(bundle::push_bundle))
        .route("/app-bundle/switch/:version", post(bundle::switch_version))
        .route("/attachments", post(attachments::upload))
        .route("/attachments/manifest", get(attachments::manifest))
        .route(
            "/attachments/:id",
            get(attachments::download).delete(attachments::delete),
        )
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/users/delete/:username", delete(users::delete_user))
        .route("/users/reset-password", post(users::reset_password))
        .route("/users/change-password", post(users::change_password))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            crate::auth::middleware::authenticate,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
