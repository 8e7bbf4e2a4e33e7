//! `/health` (public) and `/version` (any authenticated caller).

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use time::OffsetDateTime;

use super::state::AppState;

pub async fn health() -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain")],
        "OK",
    )
        .into_response()
}

#[derive(Serialize)]
pub struct VersionBody {
    name: &'static str,
    version: &'static str,
    git_sha: Option<&'static str>,
    started_at: String,
    uptime_seconds: i64,
}

pub async fn version(State(state): State<AppState>) -> Json<VersionBody> {
    let now = OffsetDateTime::now_utc();
    let started_at = *state.started_at;
    Json(VersionBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("SYNKRONUS_GIT_SHA"),
        started_at: started_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        uptime_seconds: (now - started_at).whole_seconds(),
    })
}
