// src/biometric.rs
//! Biometric enrollment watcher
//!
//! Compares what the device reports now with the last snapshot it saw. The
//! last snapshot is persisted, so a change made while the process was not
//! running is detected on the next check.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::consts::SETTING_LAST_ENROLLMENT;
use crate::error::Result;
use crate::platform::{EnrollmentSnapshot, SecurityPlatform, SettingsStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentChange {
    /// Enrolled biometry type or its domain-state token changed
    pub changed: bool,
    /// A device passcode was set or removed
    pub credential_changed: bool,
    pub previous: Option<EnrollmentSnapshot>,
    pub current: EnrollmentSnapshot,
}

pub struct BiometricWatcher {
    platform: Arc<dyn SecurityPlatform>,
    settings: Arc<dyn SettingsStore>,
    last: Mutex<Option<EnrollmentSnapshot>>,
}

impl BiometricWatcher {
    pub fn new(platform: Arc<dyn SecurityPlatform>, settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let last = match settings.get(SETTING_LAST_ENROLLMENT)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|err| warn!(%err, "stored enrollment snapshot unreadable, starting fresh"))
                .ok(),
            None => None,
        };
        Ok(Self {
            platform,
            settings,
            last: Mutex::new(last),
        })
    }

    pub fn has_baseline(&self) -> bool {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The first check only records a baseline and never reports a change
    pub fn check_for_change(&self) -> Result<EnrollmentChange> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.platform.enrollment()?;

        let (changed, credential_changed) = match last.as_ref() {
            Some(previous) => (
                previous.biometry != current.biometry
                    || previous.domain_state != current.domain_state,
                previous.device_credential_set != current.device_credential_set,
            ),
            None => (false, false),
        };

        if last.as_ref() != Some(&current) {
            self.settings
                .set(SETTING_LAST_ENROLLMENT, &serde_json::to_string(&current)?)?;
        }
        if changed {
            info!(from = ?last.as_ref().map(|s| s.biometry), to = ?current.biometry, "biometric enrollment changed");
        } else if credential_changed {
            info!(set = current.device_credential_set, "device credential changed");
        } else {
            debug!("enrollment unchanged");
        }

        let previous = last.replace(current.clone());
        Ok(EnrollmentChange {
            changed,
            credential_changed,
            previous,
            current,
        })
    }
}
