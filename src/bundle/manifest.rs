//! Component 6 — Manifest Service.
//!
//! Walks the active bundle directory, builds a deterministic file list, and
//! caches it behind a read-write lock (rare writer on swap, common readers
//! on every request) — the teacher's cache-with-invalidation shape applied
//! to a directory tree instead of a page cache (spec §4.6).

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub hash: String,
    pub mime_type: String,
    pub mod_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    pub etag: String,
}

pub struct ManifestService {
    root: PathBuf,
    cache: RwLock<Option<Manifest>>,
}

impl ManifestService {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: RwLock::new(None),
        }
    }

    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    pub fn get_manifest(&self) -> Result<Manifest> {
        if let Some(manifest) = self.cache.read().clone() {
            return Ok(manifest);
        }
        let manifest = self.build_manifest(&self.root)?;
        *self.cache.write() = Some(manifest.clone());
        Ok(manifest)
    }

    fn build_manifest(&self, root: &Path) -> Result<Manifest> {
        let mut entries = Vec::new();
        if root.exists() {
            for entry in walkdir::WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if rel == "APP_INFO.json" {
                    continue;
                }
                let bytes = std::fs::read(entry.path())?;
                let hash = hex::encode(Sha256::digest(&bytes));
                let mime_type = mime_guess::from_path(entry.path())
                    .first_or_octet_stream()
                    .to_string();
                let metadata = entry.metadata().map_err(|e| AppError::Internal(e.to_string()))?;
                let mod_time = metadata
                    .modified()
                    .ok()
                    .and_then(|t| {
                        time::OffsetDateTime::from(t)
                            .format(&time::format_description::well_known::Rfc3339)
                            .ok()
                    })
                    .unwrap_or_default();
                entries.push(ManifestEntry {
                    path: rel,
                    size: bytes.len() as u64,
                    hash,
                    mime_type,
                    mod_time,
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let etag = bundle_hash(&entries, root);
        Ok(Manifest { entries, etag })
    }

    /// Serves a file from the active directory; rejects any path that
    /// escapes the root (spec §4.6, §8 boundary behavior).
    pub fn resolve_file(&self, requested: &str) -> Result<PathBuf> {
        let candidate = safe_join(&self.root, requested)?;
        if !candidate.exists() || !candidate.is_file() {
            return Err(AppError::NotFound(format!("file `{requested}`")));
        }
        Ok(candidate)
    }

    /// SHA-256 of a file's bytes; `root_override` lets callers hash against
    /// the newest (not-yet-active) version directory for preview downloads.
    pub fn file_hash(&self, requested: &str, root_override: Option<&Path>) -> Result<String> {
        let root = root_override.unwrap_or(&self.root);
        let candidate = safe_join(root, requested)?;
        let bytes = std::fs::read(&candidate)
            .map_err(|_| AppError::NotFound(format!("file `{requested}`")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Rejects any `..` segment and joins `requested` onto `root`. Every path
/// that is served to a caller — active-tree or preview — must go through
/// this before touching the filesystem (spec §4.6, §8 boundary behavior).
pub fn safe_join(root: &Path, requested: &str) -> Result<PathBuf> {
    if requested.split('/').any(|seg| seg == "..") {
        return Err(AppError::InvalidInput(format!(
            "path `{requested}` resolves outside the active directory"
        )));
    }
    Ok(root.join(requested))
}

/// SHA-256 over `concat(path∥hash∥size)` for every entry, followed by the
/// version/timestamp read from `APP_INFO.json` if present (spec §3
/// "Manifest (per version)").
fn bundle_hash(entries: &[ManifestEntry], root: &Path) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.path.as_bytes());
        hasher.update(entry.hash.as_bytes());
        hasher.update(entry.size.to_string().as_bytes());
    }
    if let Ok(bytes) = std::fs::read(root.join("APP_INFO.json")) {
        if let Ok(info) = serde_json::from_slice::<crate::bundle::app_info::AppInfo>(&bytes) {
            hasher.update(info.version.as_bytes());
            hasher.update(info.timestamp.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_etag_changes_when_a_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"v1").unwrap();
        let service = ManifestService::new(dir.path().to_path_buf());
        let m1 = service.get_manifest().unwrap();

        std::fs::write(dir.path().join("index.html"), b"v2").unwrap();
        service.invalidate();
        let m2 = service.get_manifest().unwrap();

        assert_ne!(m1.etag, m2.etag);
    }

    #[test]
    fn manifest_is_cached_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"v1").unwrap();
        let service = ManifestService::new(dir.path().to_path_buf());
        let m1 = service.get_manifest().unwrap();

        std::fs::write(dir.path().join("index.html"), b"v2").unwrap();
        let m2 = service.get_manifest().unwrap();
        assert_eq!(m1.etag, m2.etag, "cache should still reflect v1 until invalidated");
    }

    #[test]
    fn resolve_file_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let service = ManifestService::new(dir.path().to_path_buf());
        let err = service.resolve_file("../../etc/passwd").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn safe_join_rejects_traversal_for_any_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = safe_join(dir.path(), "../../../../etc/passwd").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
