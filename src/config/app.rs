// src/config/app.rs
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::warn;

use super::defaults::*;
use super::rotation::RotationConfig;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rotation: RotationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Environment variable holding the SQLCipher passphrase
    pub passphrase_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        default_storage()
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Parse a TOML document; missing sections and fields take their defaults
pub fn from_toml_str(content: &str) -> Result<Config> {
    let conf: Config = toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
    conf.rotation.validate()?;
    Ok(conf)
}

/// Read and validate the config at `path`, applying env overrides
pub fn try_load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let mut conf = from_toml_str(&content)?;
    apply_env(&mut conf);
    Ok(conf)
}

/// Global config: loaded once, falls back to defaults if missing or invalid
pub fn load() -> &'static Config {
    CONFIG.get_or_init(|| {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !config_path.exists() {
            warn!(path = %config_path.display(), "config not found, using built-in defaults");
            let mut conf = Config::default();
            apply_env(&mut conf);
            return conf;
        }

        try_load(&config_path).unwrap_or_else(|err| {
            warn!(path = %config_path.display(), %err, "invalid config, using built-in defaults");
            let mut conf = Config::default();
            apply_env(&mut conf);
            conf
        })
    })
}

fn apply_env(conf: &mut Config) {
    if let Ok(path) = std::env::var(STORE_PATH_ENV) {
        conf.storage.db_path = PathBuf::from(path);
    }
}
