//! Configuration module for the file server.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{FileServerError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Secret used to verify bearer tokens (must be set).
    #[serde(default)]
    pub jwt_secret: String,
    /// Role granting access to every private user directory.
    #[serde(default)]
    pub admin_role: String,
}

/// Kind of a top-level storage directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryType {
    /// Open to everyone whose roles match `required_roles`.
    #[default]
    Public,
    /// Same rules as public; kept distinct for listings.
    RoleRestricted,
    /// Container of per-user sub-directories (`user/<username>`).
    UserPrivate,
}

/// Operation a user wants to perform on a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl Action {
    /// Lowercase name used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }
}

/// A top-level storage directory and its access rules.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Directory name relative to the upload root.
    pub path: String,
    /// Directory kind.
    #[serde(rename = "type", default)]
    pub dir_type: DirectoryType,
    /// Roles allowed to access the directory (empty = everyone).
    #[serde(default)]
    pub required_roles: Vec<String>,
    /// Actions permitted in this directory.
    #[serde(default)]
    pub permissions: Vec<Action>,
}

impl DirectoryConfig {
    /// Check whether the directory permits the given action at all.
    pub fn allows(&self, action: Action) -> bool {
        self.permissions.contains(&action)
    }
}

/// File storage and chunked upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all stored files.
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Chunk size advertised to clients that do not choose one.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Largest chunk size a client may choose; also the chunk body limit.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Maximum declared size of a chunked upload in bytes.
    #[serde(default = "default_max_chunk_file_size")]
    pub max_chunk_file_size: u64,
    /// Lifetime of an upload session in seconds, counted from creation.
    #[serde(default = "default_upload_session_ttl")]
    pub upload_session_ttl_secs: u64,
    /// Interval between cleanup sweeps in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Maximum number of concurrently active uploads per user.
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    /// Whether the chunked upload API is enabled.
    #[serde(default = "default_true")]
    pub chunk_upload_enabled: bool,
    /// Re-adopt unexpired sessions from their sidecars at startup.
    #[serde(default = "default_true")]
    pub restore_sessions_on_startup: bool,
    /// Compute a SHA-256 of the final file after completion.
    #[serde(default)]
    pub hash_on_complete: bool,
    /// Top-level directories.
    #[serde(default = "default_directories")]
    pub directories: Vec<DirectoryConfig>,
}

fn default_upload_path() -> String {
    "data/uploads".to_string()
}

fn default_chunk_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_chunk_size() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_max_chunk_file_size() -> u64 {
    10 * 1024 * 1024 * 1024 // 10GB
}

fn default_upload_session_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

fn default_cleanup_interval() -> u64 {
    60 * 60 // 1 hour
}

fn default_max_concurrent_uploads() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_directories() -> Vec<DirectoryConfig> {
    vec![
        DirectoryConfig {
            path: "public".to_string(),
            dir_type: DirectoryType::Public,
            required_roles: vec![],
            permissions: vec![Action::Read, Action::Write],
        },
        DirectoryConfig {
            path: "user".to_string(),
            dir_type: DirectoryType::UserPrivate,
            required_roles: vec![],
            permissions: vec![Action::Read, Action::Write, Action::Delete],
        },
    ]
}

impl StorageConfig {
    /// Session lifetime as a duration.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_session_ttl_secs)
    }

    /// Sweep interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_path: default_upload_path(),
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_chunk_file_size: default_max_chunk_file_size(),
            upload_session_ttl_secs: default_upload_session_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            chunk_upload_enabled: true,
            restore_sessions_on_startup: true,
            hash_on_complete: false,
            directories: default_directories(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/fileserver.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FileServerError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FileServerError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILESERVER_JWT_SECRET`
    /// - `FILESERVER_UPLOAD_PATH`
    /// - `FILESERVER_MAX_CHUNK_FILE_SIZE`
    /// - `FILESERVER_MAX_CONCURRENT_UPLOADS`
    /// - `FILESERVER_UPLOAD_SESSION_TTL_SECS`
    /// - `FILESERVER_CLEANUP_INTERVAL_SECS`
    ///
    /// Empty values and unparseable numbers are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(secret) = env_string("FILESERVER_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(path) = env_string("FILESERVER_UPLOAD_PATH") {
            self.storage.upload_path = path;
        }
        if let Some(size) = env_parse("FILESERVER_MAX_CHUNK_FILE_SIZE") {
            self.storage.max_chunk_file_size = size;
        }
        if let Some(limit) = env_parse("FILESERVER_MAX_CONCURRENT_UPLOADS") {
            self.storage.max_concurrent_uploads = limit;
        }
        if let Some(ttl) = env_parse("FILESERVER_UPLOAD_SESSION_TTL_SECS") {
            self.storage.upload_session_ttl_secs = ttl;
        }
        if let Some(interval) = env_parse("FILESERVER_CLEANUP_INTERVAL_SECS") {
            self.storage.cleanup_interval_secs = interval;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(FileServerError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via FILESERVER_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }

        let storage = &self.storage;
        if storage.chunk_size == 0 {
            return Err(FileServerError::Config(
                "storage.chunk_size must be greater than 0".to_string(),
            ));
        }
        if storage.max_chunk_size < storage.chunk_size {
            return Err(FileServerError::Config(
                "storage.max_chunk_size must not be smaller than storage.chunk_size".to_string(),
            ));
        }
        if storage.max_concurrent_uploads == 0 {
            return Err(FileServerError::Config(
                "storage.max_concurrent_uploads must be greater than 0".to_string(),
            ));
        }
        if storage.upload_session_ttl_secs == 0 || storage.cleanup_interval_secs == 0 {
            return Err(FileServerError::Config(
                "storage.upload_session_ttl_secs and storage.cleanup_interval_secs must be greater than 0"
                    .to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for dir in &storage.directories {
            let path = dir.path.as_str();
            if path.is_empty() || path == "." || path == ".." || path.contains(['/', '\\']) {
                return Err(FileServerError::Config(format!(
                    "directory path '{path}' must be a single relative name"
                )));
            }
            if !seen.insert(path) {
                return Err(FileServerError::Config(format!(
                    "directory path '{path}' is configured twice"
                )));
            }
        }

        Ok(())
    }

    /// Look up the configuration of a top-level directory.
    pub fn directory_config(&self, root: &str) -> Option<&DirectoryConfig> {
        self.storage.directories.iter().find(|d| d.path == root)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}
