//! Components 4.3/4.4/4.5 — Bundle Versioning, Active-Pointer Swap, Retention.
//!
//! Mirrors the teacher's stage-validate-rename checkpoint sequence: unpack
//! into a staging directory outside `versions/`, write `APP_INFO.json`,
//! rename into `versions/<NNNN>/` (immutable from then on), swap the active
//! pointer under a dedicated mutex, then retain only the newest N versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::bundle::app_info::{self, AppInfo};
use crate::bundle::manifest::ManifestService;
use crate::bundle::validator::{validate_archive, PreviousCoreHashes};
use crate::error::{AppError, Result};

const MIN_DIGITS: usize = 4;

pub struct BundleVersioning {
    versions_root: PathBuf,
    bundle_root: PathBuf,
    max_versions: usize,
    /// Serializes version assignment (the `versions/` scan) and the
    /// active-pointer swap, per spec §5 "Shared-resource policy".
    lock: Mutex<()>,
    manifest: Arc<ManifestService>,
}

impl BundleVersioning {
    pub fn new(
        versions_root: PathBuf,
        bundle_root: PathBuf,
        max_versions: usize,
        manifest: Arc<ManifestService>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&versions_root)?;
        if let Some(parent) = bundle_root.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            versions_root,
            bundle_root,
            max_versions,
            lock: Mutex::new(()),
            manifest,
        })
    }

    /// Lists known version numbers, ascending, by scanning `versions/`.
    pub fn list_versions(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        self.scan_versions()
    }

    fn scan_versions(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if self.versions_root.exists() {
            for entry in std::fs::read_dir(&self.versions_root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        if name.chars().all(|c| c.is_ascii_digit()) {
                            out.push(name.to_string());
                        }
                    }
                }
            }
        }
        out.sort_by_key(|n| n.parse::<u64>().unwrap_or(0));
        Ok(out)
    }

    fn previous_core_hashes(&self) -> Result<PreviousCoreHashes> {
        let mut out = PreviousCoreHashes::new();
        if let Ok(Some(info)) = self.active_app_info() {
            for (name, form) in info.forms {
                out.insert(name, form.core_hash);
            }
        }
        Ok(out)
    }

    fn active_app_info(&self) -> Result<Option<AppInfo>> {
        let path = self.bundle_root.join("APP_INFO.json");
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes).ok())
    }

    /// Validates and writes a new version directory, then swaps it active
    /// and runs retention. Returns the assigned version number.
    pub fn push_bundle(&self, archive_bytes: &[u8]) -> Result<String> {
        let previous = self.previous_core_hashes()?;
        let validated = validate_archive(archive_bytes, &previous).map_err(AppError::from)?;

        let _guard = self.lock.lock();
        let existing = self.scan_versions()?;
        let next_number = existing
            .iter()
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let version = format!("{next_number:0width$}", width = MIN_DIGITS);

        // Unpacked outside `versions/` (spec §4.3) so a half-written staging
        // tree is never mistaken for a committed version; only the final
        // rename below lands it under `versions_root`.
        let staging_parent = self.versions_root.parent().unwrap_or(Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(staging_parent)?;
        for (path, bytes) in &validated.files {
            let dest = staging.path().join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, bytes)?;
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let info = app_info::build(&version, &timestamp, &validated);
        std::fs::write(
            staging.path().join("APP_INFO.json"),
            serde_json::to_vec_pretty(&info)?,
        )?;

        let final_dir = self.versions_root.join(&version);
        std::fs::rename(staging.into_path(), &final_dir)?;

        self.activate(&version)?;
        self.retain();

        Ok(version)
    }

    /// Clears and repopulates the active bundle tree from `version`
    /// (spec §4.4). Serialized by the same mutex as version assignment so
    /// readers always see a complete old or complete new tree.
    pub fn activate(&self, version: &str) -> Result<()> {
        let source = self.versions_root.join(version);
        if !source.exists() {
            return Err(AppError::NotFound(format!("version `{version}`")));
        }

        let staging = tempfile::Builder::new()
            .prefix(".bundle-staging-")
            .tempdir_in(self.bundle_root.parent().unwrap_or(Path::new(".")))?;
        copy_dir_recursive(&source, staging.path())?;

        let backup = self.bundle_root.with_extension("previous");
        if self.bundle_root.exists() {
            if backup.exists() {
                std::fs::remove_dir_all(&backup)?;
            }
            std::fs::rename(&self.bundle_root, &backup)?;
        }
        std::fs::rename(staging.into_path(), &self.bundle_root)?;
        if backup.exists() {
            std::fs::remove_dir_all(&backup).ok();
        }

        self.manifest.invalidate();
        Ok(())
    }

    /// Keeps only the newest `max_versions` directories. Failures here are
    /// logged and swallowed (spec §4.5): a new version always stays active
    /// even if cleanup of an older one fails (e.g. an open reader holds it).
    fn retain(&self) {
        let versions = match self.scan_versions() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "retention: failed to list versions");
                return;
            }
        };
        if versions.len() <= self.max_versions {
            return;
        }
        let to_remove = &versions[..versions.len() - self.max_versions];
        for name in to_remove {
            let path = self.versions_root.join(name);
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(version = %name, error = %e, "retention: failed to remove old version");
            }
        }
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let opts = zip::write::FileOptions::default();
        for (name, data) in entries {
            w.start_file(*name, opts).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap();
        buf
    }

    fn harness() -> (tempfile::TempDir, BundleVersioning) {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Arc::new(ManifestService::new(dir.path().join("bundle")));
        let versioning = BundleVersioning::new(
            dir.path().join("versions"),
            dir.path().join("bundle"),
            5,
            manifest,
        )
        .unwrap();
        (dir, versioning)
    }

    #[test]
    fn first_push_is_version_0001_and_active() {
        let (_dir, v) = harness();
        let zip = zip_with(&[("app/index.html", b"<html></html>")]);
        let version = v.push_bundle(&zip).unwrap();
        assert_eq!(version, "0001");
        assert_eq!(v.list_versions().unwrap(), vec!["0001".to_string()]);
        assert!(v.bundle_root.join("app/index.html").exists());
    }

    #[test]
    fn retention_prunes_down_to_max_versions() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Arc::new(ManifestService::new(dir.path().join("bundle")));
        let v = BundleVersioning::new(
            dir.path().join("versions"),
            dir.path().join("bundle"),
            2,
            manifest,
        )
        .unwrap();
        for i in 0..3 {
            let zip = zip_with(&[("app/index.html", format!("<html>{i}</html>").as_bytes())]);
            v.push_bundle(&zip).unwrap();
        }
        assert_eq!(
            v.list_versions().unwrap(),
            vec!["0002".to_string(), "0003".to_string()]
        );
    }

    #[test]
    fn core_field_modification_is_rejected_and_not_written() {
        let (_dir, v) = harness();
        let first = zip_with(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"string"}}}"#,
            ),
        ]);
        v.push_bundle(&first).unwrap();

        let second = zip_with(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"number"}}}"#,
            ),
        ]);
        let err = v.push_bundle(&second).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(kind, _) if kind == "core_field_modified"));
        assert_eq!(v.list_versions().unwrap(), vec!["0001".to_string()]);
    }
}
