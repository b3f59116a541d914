// src/platform/software.rs
//! Platform without any hardware security tier
//!
//! Desktop hosts and the CLI run here: every request resolves to software
//! protection and there is never a biometric prompt.

use crate::capability::Capabilities;
use crate::enums::AccessPolicy;
use crate::error::PlatformError;

use super::{EnrollmentSnapshot, NativeHandle, SecurityPlatform};

#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwarePlatform;

impl SecurityPlatform for SoftwarePlatform {
    fn capabilities(&self) -> Result<Capabilities, PlatformError> {
        Ok(Capabilities::default())
    }

    fn enrollment(&self) -> Result<EnrollmentSnapshot, PlatformError> {
        Ok(EnrollmentSnapshot::default())
    }

    fn create_protection(&self, policy: AccessPolicy) -> Result<NativeHandle, PlatformError> {
        match policy {
            AccessPolicy::None => Ok(NativeHandle::new(policy)),
            other => Err(PlatformError::Rejected(format!(
                "{other:?} needs hardware this platform does not have"
            ))),
        }
    }
}
