// src/enums.rs
//! Public enum types used throughout the crate
//!
//! Central location for the enums that represent protection tiers,
//! storage backends, biometry kinds and rotation events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protection tier a caller asks for, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AccessPolicy {
    /// Hardware-isolated key store gated by biometry
    HardwareBiometric,
    /// Biometry, invalidated when the enrolled set changes
    BiometryCurrentSet,
    /// Biometry, survives enrollment changes
    BiometryAny,
    /// Device passcode / credential
    DevicePasscode,
    /// No authentication, software protection only
    #[default]
    None,
}

impl AccessPolicy {
    /// The complete fallback order, strongest to weakest
    pub const FALLBACK_CHAIN: [AccessPolicy; 5] = [
        AccessPolicy::HardwareBiometric,
        AccessPolicy::BiometryCurrentSet,
        AccessPolicy::BiometryAny,
        AccessPolicy::DevicePasscode,
        AccessPolicy::None,
    ];

    /// Security level granted when this tier is achieved
    pub fn security_level(self) -> SecurityLevel {
        match self {
            AccessPolicy::HardwareBiometric => SecurityLevel::HardwareIsolated,
            AccessPolicy::BiometryCurrentSet | AccessPolicy::BiometryAny => {
                SecurityLevel::Biometric
            }
            AccessPolicy::DevicePasscode => SecurityLevel::DeviceCredential,
            AccessPolicy::None => SecurityLevel::Software,
        }
    }

    pub fn requires_biometry(self) -> bool {
        matches!(
            self,
            AccessPolicy::HardwareBiometric
                | AccessPolicy::BiometryCurrentSet
                | AccessPolicy::BiometryAny
        )
    }

    /// Position in [`AccessPolicy::FALLBACK_CHAIN`]
    pub fn rank(self) -> usize {
        Self::FALLBACK_CHAIN
            .iter()
            .position(|p| *p == self)
            .unwrap_or(Self::FALLBACK_CHAIN.len() - 1)
    }
}

/// Tier actually granted after fallback. Ordered weakest to strongest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum SecurityLevel {
    #[default]
    Software,
    DeviceCredential,
    Biometric,
    HardwareIsolated,
}

impl SecurityLevel {
    /// Whether retrieving material at this level goes through user authentication
    pub fn requires_authentication(self) -> bool {
        self >= SecurityLevel::DeviceCredential
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityLevel::Software => "software",
            SecurityLevel::DeviceCredential => "device-credential",
            SecurityLevel::Biometric => "biometric",
            SecurityLevel::HardwareIsolated => "hardware-isolated",
        };
        f.write_str(name)
    }
}

/// Storage backend an item was written through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum Backend {
    Keystore,
    Keychain,
    CredentialVault,
    Sqlite,
    Memory,
}

/// Supported envelope algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[non_exhaustive]
pub enum CipherAlgorithm {
    #[default]
    Aes256CbcPkcs7,
}

/// Kind of biometry currently enrolled on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum BiometryType {
    #[default]
    None,
    Fingerprint,
    Face,
    Iris,
    Multiple,
}

/// What asked for a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationTrigger {
    Manual,
    Scheduled,
    BiometricChange,
    CredentialChange,
}

impl RotationTrigger {
    pub fn default_reason(self) -> &'static str {
        match self {
            RotationTrigger::Manual => "manual rotation",
            RotationTrigger::Scheduled => "scheduled rotation",
            RotationTrigger::BiometricChange => "biometric enrollment changed",
            RotationTrigger::CredentialChange => "device credential changed",
        }
    }
}

/// Kind of a [`crate::events::RotationEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationEventKind {
    Started,
    Completed,
    Failed,
    BiometricChanged,
}
