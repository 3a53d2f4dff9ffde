//! Optional TOML configuration.
//!
//! Two locations are consulted: the platform config directory
//! (`<config>/examloom/config.toml`) and a `.examloom.toml` in the current
//! working directory. The working-directory file overrides the platform one
//! field by field. Command-line flags and environment variables override
//! both; that layering lives in the CLI.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const LOCAL_CONFIG_NAME: &str = ".examloom.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub api: Option<ApiSection>,
    pub ingest: Option<IngestSection>,
}

/// Generation service settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Concurrent structuring calls.
    pub workers: Option<usize>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

/// Platform config file path, e.g. `~/.config/examloom/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("examloom").join("config.toml"))
}

/// Loads configuration from the platform path and the working directory,
/// merging the two when both exist.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let local = std::env::current_dir()
        .ok()
        .map(|dir| dir.join(LOCAL_CONFIG_NAME))
        .and_then(|p| load_from_path(&p));
    match (platform, local) {
        (Some(base), Some(overlay)) => merge(base, overlay),
        (Some(config), None) | (None, Some(config)) => config,
        (None, None) => ConfigFile::default(),
    }
}

pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&contents) {
        Ok(config) => Some(config),
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "ignoring unreadable config file");
            None
        }
    }
}

/// Field-by-field merge; `overlay` wins wherever it has a value.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: match (base.api, overlay.api) {
            (Some(b), Some(o)) => Some(ApiSection {
                key: o.key.or(b.key),
                base_url: o.base_url.or(b.base_url),
                model: o.model.or(b.model),
            }),
            (b, o) => o.or(b),
        },
        ingest: match (base.ingest, overlay.ingest) {
            (Some(b), Some(o)) => Some(IngestSection {
                workers: o.workers.or(b.workers),
                request_timeout_secs: o.request_timeout_secs.or(b.request_timeout_secs),
            }),
            (b, o) => o.or(b),
        },
    }
}
