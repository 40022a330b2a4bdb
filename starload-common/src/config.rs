//! Configuration file resolution and the shared connection/credential sections

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "STARLOAD_CONFIG";

/// One `[connections.<id>]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `redshift://`, `postgres://`, `postgresql://` or `sqlite:` URL
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// One `[credentials.<id>]` entry
///
/// Either field may be left out and supplied through the environment instead
/// (see [`crate::credentials::CredentialStore`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Configuration file resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. `STARLOAD_CONFIG` environment variable
/// 3. `~/.config/starload/config.toml`, then `/etc/starload/config.toml`
///
/// Returns `None` when nothing is found; callers fall back to built-in defaults.
/// An explicitly named file (1 or 2) that does not exist is an error.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_exists(path.to_path_buf()).map(Some);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return require_exists(PathBuf::from(path)).map(Some);
        }
    }

    // Priority 3: Well-known locations
    let user_config = dirs::config_dir().map(|d| d.join("starload").join("config.toml"));
    let system_config = PathBuf::from("/etc/starload/config.toml");
    for candidate in user_config.into_iter().chain(std::iter::once(system_config)) {
        if candidate.exists() {
            debug!("Found config file at {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn require_exists(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}
