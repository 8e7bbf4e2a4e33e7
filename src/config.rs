//! Server configuration: CLI flags and environment variables, optionally
//! layered over a TOML file, following the teacher's file-then-overrides
//! shape (`src/bin/cli/config.rs`) minus its profile/multi-database concepts.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Recognized options from spec §6 "Configuration", plus the ambient
/// `bind_host`/`bind_port`/`log_level` this crate needs to actually run.
#[derive(Debug, Clone, Parser)]
#[command(name = "synkronus-server", about = "Synkronus sync/bundle/attachment server")]
pub struct Config {
    /// Path to an optional TOML config file layered beneath these flags.
    #[arg(long, env = "SYNKRONUS_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// SQLite database file backing observations, users, and the version counter.
    #[arg(long, env = "SYNKRONUS_DB", default_value = "synkronus.db")]
    pub db_connection: PathBuf,

    /// HMAC-SHA256 signing key for access/refresh tokens.
    #[arg(long, env = "SYNKRONUS_JWT_SECRET", default_value = "change-me-in-production")]
    pub jwt_secret: String,

    /// Access-token lifetime in seconds.
    #[arg(long, env = "SYNKRONUS_TOKEN_TTL", default_value_t = 900)]
    pub token_ttl: i64,

    /// Refresh-token lifetime in seconds.
    #[arg(long, env = "SYNKRONUS_REFRESH_TTL", default_value_t = 1_209_600)]
    pub refresh_ttl: i64,

    /// Bootstrap admin username, used only when the user store is empty.
    #[arg(long, env = "SYNKRONUS_ADMIN_USERNAME", default_value = "admin")]
    pub admin_username: String,

    /// Bootstrap admin password, used only when the user store is empty.
    #[arg(long, env = "SYNKRONUS_ADMIN_PASSWORD", default_value = "admin")]
    pub admin_password: String,

    /// Active bundle tree served by the Manifest Service.
    #[arg(long, env = "SYNKRONUS_BUNDLE_PATH", default_value = "data/bundle")]
    pub bundle_path: PathBuf,

    /// Root of immutable `versions/NNNN/` directories.
    #[arg(long, env = "SYNKRONUS_VERSIONS_PATH", default_value = "data/versions")]
    pub versions_path: PathBuf,

    /// Number of most-recent versions to retain.
    #[arg(long, env = "SYNKRONUS_MAX_VERSIONS", default_value_t = 5)]
    pub max_versions: usize,

    /// Upper bound on `limit` accepted by `/sync/pull`.
    #[arg(long, env = "SYNKRONUS_MAX_PULL_PAGE", default_value_t = 500)]
    pub max_pull_page: usize,

    /// Content-addressed attachment store root.
    #[arg(long, env = "SYNKRONUS_ATTACHMENTS_PATH", default_value = "data/attachments")]
    pub attachments_path: PathBuf,

    /// Interface to bind the HTTP listener to.
    #[arg(long, env = "SYNKRONUS_HOST", default_value = "0.0.0.0")]
    pub bind_host: IpAddr,

    /// Port to bind the HTTP listener to.
    #[arg(long, env = "SYNKRONUS_PORT", default_value_t = 8080)]
    pub bind_port: u16,

    /// `tracing_subscriber::EnvFilter` directive string.
    #[arg(long, env = "SYNKRONUS_LOG", default_value = "info")]
    pub log_level: String,
}

/// Mirrors [`Config`]'s fields for TOML deserialization; every field is
/// optional so a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    db_connection: Option<PathBuf>,
    jwt_secret: Option<String>,
    token_ttl: Option<i64>,
    refresh_ttl: Option<i64>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    bundle_path: Option<PathBuf>,
    versions_path: Option<PathBuf>,
    max_versions: Option<usize>,
    max_pull_page: Option<usize>,
    attachments_path: Option<PathBuf>,
    bind_host: Option<IpAddr>,
    bind_port: Option<u16>,
    log_level: Option<String>,
}

impl Config {
    /// Parses CLI args/env vars, then layers an optional TOML file beneath
    /// them: values actually supplied on the command line (or via env, which
    /// clap treats the same way) win over the file; the file wins over the
    /// built-in defaults above.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Config::parse();
        if let Some(path) = cfg.config_file.clone().or_else(default_config_path) {
            if path.exists() {
                cfg.apply_file(&path)?;
            }
        }
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Only back-fill values still at their clap defaults, so an explicit
        // CLI flag or env var always outranks the file.
        let defaults = Config::parse_from(["synkronus-server"]);
        if let Some(v) = file.db_connection.filter(|_| self.db_connection == defaults.db_connection) {
            self.db_connection = v;
        }
        if let Some(v) = file.jwt_secret.filter(|_| self.jwt_secret == defaults.jwt_secret) {
            self.jwt_secret = v;
        }
        if let Some(v) = file.token_ttl.filter(|_| self.token_ttl == defaults.token_ttl) {
            self.token_ttl = v;
        }
        if let Some(v) = file.refresh_ttl.filter(|_| self.refresh_ttl == defaults.refresh_ttl) {
            self.refresh_ttl = v;
        }
        if let Some(v) = file.admin_username.filter(|_| self.admin_username == defaults.admin_username) {
            self.admin_username = v;
        }
        if let Some(v) = file.admin_password.filter(|_| self.admin_password == defaults.admin_password) {
            self.admin_password = v;
        }
        if let Some(v) = file.bundle_path.filter(|_| self.bundle_path == defaults.bundle_path) {
            self.bundle_path = v;
        }
        if let Some(v) = file.versions_path.filter(|_| self.versions_path == defaults.versions_path) {
            self.versions_path = v;
        }
        if let Some(v) = file.max_versions.filter(|_| self.max_versions == defaults.max_versions) {
            self.max_versions = v;
        }
        if let Some(v) = file.max_pull_page.filter(|_| self.max_pull_page == defaults.max_pull_page) {
            self.max_pull_page = v;
        }
        if let Some(v) = file.attachments_path.filter(|_| self.attachments_path == defaults.attachments_path) {
            self.attachments_path = v;
        }
        if let Some(v) = file.bind_host.filter(|_| self.bind_host == defaults.bind_host) {
            self.bind_host = v;
        }
        if let Some(v) = file.bind_port.filter(|_| self.bind_port == defaults.bind_port) {
            self.bind_port = v;
        }
        if let Some(v) = file.log_level.filter(|_| self.log_level == defaults.log_level) {
            self.log_level = v;
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("synkronus").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_fill_in_unset_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_versions = 9\nbind_port = 9999\n").unwrap();

        let mut cfg = Config::parse_from(["synkronus-server"]);
        cfg.apply_file(&path).unwrap();

        assert_eq!(cfg.max_versions, 9);
        assert_eq!(cfg.bind_port, 9999);
        assert_eq!(cfg.admin_username, "admin");
    }
}
