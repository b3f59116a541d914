// src/config/mod.rs
//! Configuration system for key-rotation-vault
//!
//! Central, lazy-loaded global config with TOML + env overrides, plus the
//! rotation settings the engine persists as scalars in the settings store.

pub use app::{from_toml_str, load, try_load, Config, StorageConfig};
pub use rotation::RotationConfig;

mod app;
mod defaults;
mod rotation;
