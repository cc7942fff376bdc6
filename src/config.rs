//! Configuration - storage and API settings
//!
//! TigerStyle: every knob has a flag, an environment fallback and a default.
//!
//! The storage selector is read once at startup; nothing re-reads it.

use std::path::PathBuf;

use clap::Args;

use crate::storage::StorageKind;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Default JSON file for the file store
pub const FILE_PATH_DEFAULT: &str = "file.json";

/// Default relational store URL
pub const DB_URL_DEFAULT: &str = "sqlite://hbnb.db";

/// Default relational pool size
pub const DB_MAX_CONNECTIONS_DEFAULT: u32 = 10;

/// Upper bound on the relational pool size
pub const DB_MAX_CONNECTIONS_MAX: u32 = 256;

/// Default API bind host
pub const API_HOST_DEFAULT: &str = "0.0.0.0";

/// Default API bind port
pub const API_PORT_DEFAULT: u16 = 5000;

// =============================================================================
// StorageConfig
// =============================================================================

/// Which backend to run and where its data lives.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage backend
    #[arg(long = "storage", env = "HBNB_TYPE_STORAGE", value_enum, default_value_t = StorageKind::File)]
    pub kind: StorageKind,

    /// JSON file used by the file backend
    #[arg(long, env = "HBNB_FILE_PATH", default_value = FILE_PATH_DEFAULT)]
    pub file_path: String,

    /// Database URL used by the db backend
    #[arg(long, env = "HBNB_DB_URL", default_value = DB_URL_DEFAULT)]
    pub db_url: String,

    /// Connection pool size for the db backend
    #[arg(
        long,
        env = "HBNB_DB_MAX_CONNECTIONS",
        default_value_t = DB_MAX_CONNECTIONS_DEFAULT,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(DB_MAX_CONNECTIONS_MAX))
    )]
    pub db_max_connections: u32,
}

impl StorageConfig {
    /// File store at `path`.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: StorageKind::File,
            file_path: path.into(),
            ..Self::default()
        }
    }

    /// Relational store at `url`.
    #[must_use]
    pub fn db(url: impl Into<String>) -> Self {
        Self {
            kind: StorageKind::Db,
            db_url: url.into(),
            ..Self::default()
        }
    }

    /// File path with `~` and environment variables expanded.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        match shellexpand::full(&self.file_path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(path = %self.file_path, error = %e, "could not expand file path");
                PathBuf::from(shellexpand::tilde(&self.file_path).as_ref())
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            file_path: FILE_PATH_DEFAULT.to_string(),
            db_url: DB_URL_DEFAULT.to_string(),
            db_max_connections: DB_MAX_CONNECTIONS_DEFAULT,
        }
    }
}

// =============================================================================
// ApiConfig
// =============================================================================

/// Where the REST facade listens.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Bind host
    #[arg(long = "host", env = "HBNB_API_HOST", default_value = API_HOST_DEFAULT)]
    pub host: String,

    /// Bind port
    #[arg(long = "port", env = "HBNB_API_PORT", default_value_t = API_PORT_DEFAULT)]
    pub port: u16,
}

impl ApiConfig {
    /// `host:port` string for logging and binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: API_HOST_DEFAULT.to_string(),
            port: API_PORT_DEFAULT,
        }
    }
}
