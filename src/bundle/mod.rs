//! The App-Bundle Engine: components 4–6 and 9 from spec §2, assembled
//! behind one `BundleService` facade the HTTP layer talks to.

pub mod app_info;
pub mod changelog;
pub mod manifest;
pub mod schema;
pub mod validator;
pub mod versioning;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{AppError, Result};

use self::app_info::AppInfo;
use self::changelog::ChangeLog;
use self::manifest::{Manifest, ManifestService};
use self::versioning::BundleVersioning;

pub struct BundleService {
    pub manifest: Arc<ManifestService>,
    pub versioning: BundleVersioning,
    versions_root: PathBuf,
}

impl BundleService {
    pub fn new(bundle_path: PathBuf, versions_path: PathBuf, max_versions: usize) -> Result<Self> {
        let manifest = Arc::new(ManifestService::new(bundle_path.clone()));
        let versioning =
            BundleVersioning::new(versions_path.clone(), bundle_path, max_versions, manifest.clone())?;
        Ok(Self {
            manifest,
            versioning,
            versions_root: versions_path,
        })
    }

    pub fn push_bundle(&self, archive_bytes: &[u8]) -> Result<String> {
        self.versioning.push_bundle(archive_bytes)
    }

    pub fn switch(&self, version: &str) -> Result<()> {
        self.versioning.activate(version)
    }

    pub fn list_versions(&self) -> Result<Vec<String>> {
        self.versioning.list_versions()
    }

    pub fn get_manifest(&self) -> Result<Manifest> {
        self.manifest.get_manifest()
    }

    fn read_app_info(&self, version: &str) -> Result<AppInfo> {
        let path = self.versions_root.join(version).join("APP_INFO.json");
        let bytes = std::fs::read(&path)
            .map_err(|_| AppError::NotFound(format!("version `{version}`")))?;
        serde_json::from_slice(&bytes).map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn changes(&self, version_a: &str, version_b: &str) -> Result<ChangeLog> {
        let a = self.read_app_info(version_a)?;
        let b = self.read_app_info(version_b)?;
        Ok(changelog::compare(&a, &b))
    }

    /// The newest version directory, used for `?preview=true` downloads even
    /// when it is not yet active (spec §4.6 `use_latest`).
    pub fn latest_version_dir(&self) -> Result<Option<PathBuf>> {
        let versions = self.versioning.list_versions()?;
        Ok(versions.last().map(|v| self.versions_root.join(v)))
    }
}
