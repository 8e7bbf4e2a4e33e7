//! `/app-bundle/*` — manifest, file download, version listing, change-log,
//! bundle push, and active-version switch.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::auth::middleware::require_role;
use crate::auth::{Claims, Role};
use crate::bundle::changelog::ChangeLog;
use crate::bundle::manifest::{safe_join, Manifest};
use crate::error::{AppError, Result};

use super::state::AppState;

pub async fn manifest(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<Response> {
    let manifest: Manifest = state.bundle.get_manifest()?;
    if let Some(inm) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if inm.trim_matches('"') == manifest.etag {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }
    let etag = HeaderValue::from_str(&format!("\"{}\"", manifest.etag))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let mut response = Json(manifest).into_response();
    response.headers_mut().insert(header::ETAG, etag);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    preview: bool,
}

/// Serves a file from the active bundle tree, or from the newest (not yet
/// active) version directory when `?preview=true` — the `x-is-preview`
/// response header tells the caller which one it got (spec §4.6).
pub async fn download(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(path): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let (file_path, is_preview) = if query.preview {
        match state.bundle.latest_version_dir()? {
            Some(dir) => (safe_join(&dir, &path)?, true),
            None => return Err(AppError::NotFound("no bundle versions pushed yet".to_string())),
        }
    } else {
        (state.bundle.manifest.resolve_file(&path)?, false)
    };

    if !file_path.exists() || !file_path.is_file() {
        return Err(AppError::NotFound(format!("file `{path}`")));
    }

    let file = tokio::fs::File::open(&file_path).await?;
    let mime_type = mime_guess::from_path(&file_path).first_or_octet_stream();
    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_str(mime_type.as_ref()).unwrap());
    response.headers_mut().insert(
        "x-is-preview",
        HeaderValue::from_static(if is_preview { "true" } else { "false" }),
    );
    Ok(response)
}

#[derive(Debug, Serialize)]
pub struct VersionsBody {
    versions: Vec<String>,
}

pub async fn list_versions(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<VersionsBody>> {
    Ok(Json(VersionsBody {
        versions: state.bundle.list_versions()?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    current: String,
    target: String,
}

pub async fn changes(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangeLog>> {
    Ok(Json(state.bundle.changes(&query.current, &query.target)?))
}

/// Accepts a multipart upload containing a single `bundle` field with the
/// zip archive (spec §4.4 "push").
pub async fn push_bundle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    require_role(&claims, Role::Admin)?;

    let mut bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        if field.name() == Some("bundle") {
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?,
            );
        }
    }
    let bytes = bytes.ok_or_else(|| AppError::InvalidInput("missing `bundle` field".to_string()))?;
    let version = state.bundle.push_bundle(&bytes)?;
    Ok(Json(serde_json::json!({ "version": version })))
}

pub async fn switch_version(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(version): Path<String>,
) -> Result<()> {
    require_role(&claims, Role::Admin)?;
    state.bundle.switch(&version)
}
