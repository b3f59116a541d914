// src/config/defaults.rs
use std::path::PathBuf;

use crate::config::app::StorageConfig;
use crate::consts::{DEFAULT_NAMESPACE, DEFAULT_SWEEP_BATCH_SIZE};

/// 30 days
pub const DEFAULT_ROTATION_INTERVAL_MS: u64 = 30 * 24 * 60 * 60 * 1000;
pub const DEFAULT_MAX_KEY_VERSIONS: usize = 5;

/// Bounds for the scheduler tick derived from the rotation interval
pub const MIN_CHECK_INTERVAL_MS: u64 = 60 * 1000;
pub const MAX_CHECK_INTERVAL_MS: u64 = 60 * 60 * 1000;

pub const DEFAULT_CONFIG_PATH: &str = "key-rotation.toml";
pub const CONFIG_PATH_ENV: &str = "EKR_CONFIG";
pub const STORE_PATH_ENV: &str = "EKR_STORE_DB";
pub const STORE_KEY_ENV: &str = "EKR_STORE_KEY";

pub fn default_namespaces() -> Vec<String> {
    vec![DEFAULT_NAMESPACE.to_owned()]
}

pub fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("key-rotation-vault")
        .join("store.db")
}

pub fn default_storage() -> StorageConfig {
    StorageConfig {
        db_path: default_store_path(),
        passphrase_env: STORE_KEY_ENV.into(),
    }
}
