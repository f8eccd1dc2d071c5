//! Layered configuration for warden.
//!
//! Layers, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A configuration file: the one given explicitly, otherwise
//!    `warden.toml` in the platform configuration directory if it exists.
//!    TOML, YAML and JSON are recognised by extension.
//! 3. Environment variables prefixed `WARDEN_`, with `__` separating nested
//!    keys (`WARDEN_SCAN__WORKERS=8`, `WARDEN_STORAGE__BUCKET=uploads`).

pub mod error;
mod model;

pub use crate::model::{Config, LedgerConfig, ScanConfig, StorageConfig, StorageKind};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "WARDEN_";
const FILE_NAME: &str = "warden.toml";

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "warden")
}

/// Default location of the configuration file, whether or not it exists.
pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(FILE_NAME))
}

/// Assemble every configuration layer without extracting it.
///
/// An explicit path must exist; the default path is skipped silently when
/// missing.
pub fn layers(explicit: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    let file = match explicit {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => default_path().filter(|path| path.is_file()),
    };
    if let Some(path) = file {
        tracing::debug!(path = %path.display(), "Loading configuration file");
        figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(&path)),
            Some("json") => figment.merge(Json::file(&path)),
            _ => figment.merge(Toml::file(&path)),
        };
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Load and validate the configuration.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    Config::from_figment(&layers(explicit)?)
}

impl Config {
    /// Extract and validate a configuration from prepared layers.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }
}
