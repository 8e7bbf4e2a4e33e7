//! `/attachments/*` — content-addressed blob upload, download, and delete.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{Json, Response};
use axum::Extension;
use futures::TryStreamExt;
use tokio_util::io::ReaderStream;

use crate::attachments::AttachmentMeta;
use crate::auth::middleware::require_role;
use crate::auth::{Claims, Role};
use crate::error::{AppError, Result};

use super::state::AppState;

/// Accepts a single multipart field named `file`, with an optional
/// `content_hash` field the caller can supply to have the upload verified
/// against a hash it already computed client-side.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<AttachmentMeta>> {
    require_role(&claims, Role::ReadWrite)?;

    let mut declared_hash: Option<String> = None;
    let mut file_field: Option<(String, axum::extract::multipart::Field)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        match field.name() {
            Some("content_hash") => {
                declared_hash = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(e.to_string()))?,
                );
            }
            Some("file") => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                file_field = Some((mime_type, field));
            }
            _ => {}
        }
    }

    let (mime_type, field) =
        file_field.ok_or_else(|| AppError::InvalidInput("missing `file` field".to_string()))?;
    let stream = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let meta = state
        .attachments
        .put(Box::pin(stream), declared_hash.as_deref(), &mime_type)
        .await?;
    Ok(Json(meta))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Response> {
    let (path, _size) = state.attachments.get(&id).await?;
    let file = tokio::fs::File::open(&path).await?;
    let mime_type = mime_guess::from_path(&path).first_or_octet_stream();
    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_str(mime_type.as_ref()).unwrap());
    Ok(response)
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<()> {
    require_role(&claims, Role::Admin)?;
    state.attachments.delete(&id).await
}

pub async fn manifest(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<AttachmentMeta>>> {
    Ok(Json(state.attachments.manifest()?))
}
