// src/capability.rs
//! Security capability probe
//!
//! Asks the platform which protection tiers exist right now. Results are
//! never cached here: biometric enrollment can change between two calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::enums::AccessPolicy;
use crate::error::Result;
use crate::platform::SecurityPlatform;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Hardware-isolated key store (secure enclave, StrongBox, TPM)
    pub hardware_isolated: bool,
    /// Biometric sensor present *and* at least one biometric enrolled
    pub biometric: bool,
    /// Device passcode / PIN / pattern configured
    pub device_credential: bool,
    /// Too many failed attempts; biometry unusable until a passcode unlock
    pub biometry_locked_out: bool,
}

impl Capabilities {
    /// Whether the prerequisite capability for `policy` is present
    pub fn supports(&self, policy: AccessPolicy) -> bool {
        match policy {
            AccessPolicy::HardwareBiometric => self.hardware_isolated && self.biometric,
            AccessPolicy::BiometryCurrentSet | AccessPolicy::BiometryAny => self.biometric,
            AccessPolicy::DevicePasscode => self.device_credential,
            AccessPolicy::None => true,
        }
    }
}

#[derive(Clone)]
pub struct CapabilityProbe {
    platform: Arc<dyn SecurityPlatform>,
}

impl CapabilityProbe {
    pub fn new(platform: Arc<dyn SecurityPlatform>) -> Self {
        Self { platform }
    }

    pub fn probe(&self) -> Result<Capabilities> {
        Ok(self.platform.capabilities()?)
    }

    /// Biometric hardware present and enrolled
    pub fn is_sensor_available(&self) -> Result<bool> {
        Ok(self.probe()?.biometric)
    }
}
