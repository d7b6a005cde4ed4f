//! Defaults read from `cli.toml`.
//!
//! ```toml
//! [database]
//! default = "/var/lib/clinic"
//!
//! [store]
//! synchronous = "normal"
//! checkpoint_threshold = 500
//! capacity_bytes = 67108864
//! ```

use std::path::{Path, PathBuf};

use clinicdb::admin::AdminOpenOptions;
use serde::Deserialize;
use thiserror::Error;

use super::SynchronousArg;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read CLI config {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CLI config {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default)]
pub struct CliConfig {
    source: Option<PathBuf>,
    file: ConfigFile,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseDefaults,
    #[serde(default)]
    store: StoreDefaults,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseDefaults {
    default: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreDefaults {
    synchronous: Option<SynchronousArg>,
    checkpoint_threshold: Option<u64>,
    capacity_bytes: Option<u64>,
}

impl CliConfig {
    /// Loads `explicit`, or the per-user file when none is given. A missing
    /// file yields empty defaults; an unreadable or invalid one is an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let Some(path) = explicit.or_else(user_config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let file = toml::from_str(&text).map_err(|source| ConfigError::Invalid {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            source: Some(path),
            file,
        })
    }

    /// File the settings came from, if one was read.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn default_db(&self) -> Option<&Path> {
        self.file.database.default.as_deref()
    }

    /// Open options from the `[store]` table, with command-line flags taking
    /// precedence.
    pub fn open_options(
        &self,
        synchronous: Option<SynchronousArg>,
        checkpoint_threshold: Option<u64>,
    ) -> AdminOpenOptions {
        let store = &self.file.store;
        let mut opts = AdminOpenOptions::default();
        if let Some(mode) = synchronous.or(store.synchronous) {
            opts.synchronous = mode.into();
        }
        if let Some(frames) = checkpoint_threshold.or(store.checkpoint_threshold) {
            opts.checkpoint_threshold = frames;
        }
        if store.capacity_bytes.is_some() {
            opts.capacity_bytes = store.capacity_bytes;
        }
        opts
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("clinicdb").join("cli.toml"))
}
