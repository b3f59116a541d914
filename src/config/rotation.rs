// src/config/rotation.rs
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::consts::*;
use crate::error::{CoreError, Result};
use crate::platform::SettingsStore;

/// Arguments of `initialize_key_rotation`, plus the knobs around them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub enabled: bool,
    /// 0 disables time-based rotation
    pub rotation_interval_ms: u64,
    pub rotate_on_biometric_change: bool,
    pub rotate_on_credential_change: bool,
    pub manual_rotation_enabled: bool,
    pub max_key_versions: usize,
    pub background_re_encryption: bool,
    /// New KEKs are stored behind biometry
    pub key_requires_biometry: bool,
    /// Biometric KEKs die with the enrolled set (see `BiometryCurrentSet`)
    pub invalidate_on_enrollment: bool,
    /// Namespaces swept on rotation and scanned before pruning
    pub namespaces: Vec<String>,
    pub sweep_batch_size: usize,
    /// Scheduler tick; derived from the rotation interval when absent
    pub check_interval_ms: Option<u64>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_interval_ms: DEFAULT_ROTATION_INTERVAL_MS,
            rotate_on_biometric_change: true,
            rotate_on_credential_change: false,
            manual_rotation_enabled: true,
            max_key_versions: DEFAULT_MAX_KEY_VERSIONS,
            background_re_encryption: true,
            key_requires_biometry: false,
            invalidate_on_enrollment: true,
            namespaces: default_namespaces(),
            sweep_batch_size: default_sweep_batch_size(),
            check_interval_ms: None,
        }
    }
}

impl RotationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_key_versions == 0 {
            return Err(CoreError::Config("max_key_versions must be at least 1".into()));
        }
        if self.sweep_batch_size == 0 {
            return Err(CoreError::Config("sweep_batch_size must be at least 1".into()));
        }
        if self.namespaces.iter().any(|ns| ns.is_empty()) {
            return Err(CoreError::Config("namespaces must not be empty strings".into()));
        }
        Ok(())
    }

    /// `None` when time-based rotation is off
    pub fn rotation_interval(&self) -> Option<Duration> {
        (self.enabled && self.rotation_interval_ms > 0)
            .then(|| Duration::from_millis(self.rotation_interval_ms))
    }

    /// Scheduler tick: explicit value, else a tenth of the rotation interval
    /// clamped to [1 min, 1 h]; 1 h when time-based rotation is off
    pub fn check_interval(&self) -> Duration {
        if let Some(ms) = self.check_interval_ms {
            return Duration::from_millis(ms.max(1));
        }
        let ms = match self.rotation_interval() {
            Some(interval) => (interval.as_millis() as u64 / 10)
                .clamp(MIN_CHECK_INTERVAL_MS, MAX_CHECK_INTERVAL_MS),
            None => MAX_CHECK_INTERVAL_MS,
        };
        Duration::from_millis(ms)
    }

    /// Write the `initialize_key_rotation` flags as scalars
    pub fn store_scalars(&self, settings: &dyn SettingsStore) -> Result<()> {
        let scalars = [
            (SETTING_ENABLED, self.enabled.to_string()),
            (SETTING_INTERVAL_MS, self.rotation_interval_ms.to_string()),
            (
                SETTING_ROTATE_ON_BIOMETRIC,
                self.rotate_on_biometric_change.to_string(),
            ),
            (
                SETTING_ROTATE_ON_CREDENTIAL,
                self.rotate_on_credential_change.to_string(),
            ),
            (
                SETTING_MANUAL_ROTATION,
                self.manual_rotation_enabled.to_string(),
            ),
            (SETTING_MAX_KEY_VERSIONS, self.max_key_versions.to_string()),
            (
                SETTING_BACKGROUND_REENCRYPTION,
                self.background_re_encryption.to_string(),
            ),
        ];
        for (key, value) in scalars {
            settings.set(key, &value)?;
        }
        Ok(())
    }

    /// Overlay persisted scalars on `self`. Unset or unparsable values keep
    /// the current field.
    pub fn load_scalars(mut self, settings: &dyn SettingsStore) -> Result<Self> {
        read(settings, SETTING_ENABLED, &mut self.enabled)?;
        read(settings, SETTING_INTERVAL_MS, &mut self.rotation_interval_ms)?;
        read(
            settings,
            SETTING_ROTATE_ON_BIOMETRIC,
            &mut self.rotate_on_biometric_change,
        )?;
        read(
            settings,
            SETTING_ROTATE_ON_CREDENTIAL,
            &mut self.rotate_on_credential_change,
        )?;
        read(
            settings,
            SETTING_MANUAL_ROTATION,
            &mut self.manual_rotation_enabled,
        )?;
        read(settings, SETTING_MAX_KEY_VERSIONS, &mut self.max_key_versions)?;
        read(
            settings,
            SETTING_BACKGROUND_REENCRYPTION,
            &mut self.background_re_encryption,
        )?;
        Ok(self)
    }
}

fn read<T: FromStr>(settings: &dyn SettingsStore, key: &str, field: &mut T) -> Result<()> {
    if let Some(value) = settings.get(key)?.and_then(|raw| raw.parse().ok()) {
        *field = value;
    }
    Ok(())
}
