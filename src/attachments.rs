//! Component 3 — Attachment Store.
//!
//! Content-addressed blob storage: bytes are staged to a temp file while
//! being hashed, then renamed into `attachments/<aa>/<hash>` so readers never
//! observe a partial write (spec §3, §4.9) — the same stage-then-rename
//! durability idiom the teacher uses for its WAL segments.

use std::path::PathBuf;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Any stream of byte chunks a caller can hand us: an axum `Multipart` field,
/// a request body, or a small in-memory stream in tests.
pub trait BytesStream: Stream<Item = std::io::Result<Bytes>> + Unpin {}
impl<T> BytesStream for T where T: Stream<Item = std::io::Result<Bytes>> + Unpin {}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentMeta {
    pub id: String,
    pub content_hash: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(root.join(".staging"))?;
        Ok(Self { root })
    }

    /// Rejects ids too short (or with a non-ASCII first code point) to slice
    /// a two-character prefix from, instead of panicking on a bad byte index.
    fn path_for(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 2 || !hash.is_char_boundary(2) {
            return Err(AppError::NotFound(format!("attachment `{hash}`")));
        }
        Ok(self.root.join(&hash[..2]).join(hash))
    }

    /// Streams `body` to a staging file while hashing it, rejects on a
    /// mismatched `declared_hash`, then renames it into its content-addressed
    /// path. Duplicate content (same hash) is accepted idempotently.
    pub async fn put(
        &self,
        mut body: impl BytesStream,
        declared_hash: Option<&str>,
        mime_type: &str,
    ) -> Result<AttachmentMeta> {
        let staging_path = self.root.join(".staging").join(uuid::Uuid::new_v4().to_string());
        let mut file = tokio::fs::File::create(&staging_path).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AppError::Internal(e.to_string()))?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let content_hash = hex::encode(hasher.finalize());
        if let Some(declared) = declared_hash {
            if !declared.eq_ignore_ascii_case(&content_hash) {
                tokio::fs::remove_file(&staging_path).await.ok();
                return Err(AppError::InvalidInput(format!(
                    "declared hash {declared} does not match computed hash {content_hash}"
                )));
            }
        }

        let dest = self.path_for(&content_hash)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !dest.exists() {
            tokio::fs::rename(&staging_path, &dest).await?;
        } else {
            // identical content already stored; drop the redundant staging copy.
            tokio::fs::remove_file(&staging_path).await.ok();
        }

        Ok(AttachmentMeta {
            id: content_hash.clone(),
            content_hash,
            size,
            mime_type: mime_type.to_string(),
        })
    }

    pub async fn exists(&self, id: &str) -> bool {
        match self.path_for(id) {
            Ok(path) => tokio::fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn get(&self, id: &str) -> Result<(PathBuf, u64)> {
        let path = self.path_for(id)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| AppError::NotFound(format!("attachment `{id}`")))?;
        Ok((path, meta.len()))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|_| AppError::NotFound(format!("attachment `{id}`")))
    }

    /// Enumerates all stored attachments by walking the two-level
    /// content-addressed directory layout.
    pub fn manifest(&self) -> Result<Vec<AttachmentMeta>> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().starts_with(self.root.join(".staging")) {
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let hash = entry.file_name().to_string_lossy().to_string();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let mime_type = mime_guess::from_path(entry.path())
                .first_or_octet_stream()
                .to_string();
            out.push(AttachmentMeta {
                id: hash.clone(),
                content_hash: hash,
                size,
                mime_type,
            });
        }
        Ok(out)
    }
}

/// Computes the SHA-256 hash of an in-memory buffer; used by tests and by
/// callers that already hold the full body (small uploads).
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(data: Vec<u8>) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
        futures::stream::once(async move { Ok(Bytes::from(data)) })
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf()).unwrap();
        let meta = store
            .put(stream_of(b"hello world".to_vec()), None, "text/plain")
            .await
            .unwrap();
        assert_eq!(meta.content_hash, hash_bytes(b"hello world"));
        assert!(store.exists(&meta.id).await);
        let (path, size) = store.get(&meta.id).await.unwrap();
        assert_eq!(size, 11);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn declared_hash_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf()).unwrap();
        let err = store
            .put(stream_of(b"hello".to_vec()), Some("deadbeef"), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn get_rejects_an_id_too_short_to_slice_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.get("a").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!store.exists("a").await);
        let err = store.delete("a").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_rejects_an_id_with_a_non_ascii_first_code_point() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.get("é-not-a-hash").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_content_shares_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf()).unwrap();
        let a = store.put(stream_of(b"same".to_vec()), None, "text/plain").await.unwrap();
        let b = store.put(stream_of(b"same".to_vec()), None, "text/plain").await.unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(store.manifest().unwrap().len(), 1);
    }
}
