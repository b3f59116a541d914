// src/access_control.rs
//! Access control resolver
//!
//! Maps a requested protection policy to the strongest tier the device can
//! actually provide. The fallback order is the explicit list
//! [`AccessPolicy::FALLBACK_CHAIN`] and the walk over it is the single
//! generic function [`walk_down`], so the order can be tested without any
//! platform code.
//!
//! Unavailability never fails a resolution: the walk ends at software
//! protection, which has no external dependency. Only platform API errors
//! propagate.

use std::sync::Arc;

use tracing::debug;

use crate::capability::{Capabilities, CapabilityProbe};
use crate::enums::{AccessPolicy, SecurityLevel};
use crate::error::{CoreError, Result};
use crate::platform::{NativeHandle, SecurityPlatform};

#[derive(Debug, Clone)]
pub struct ResolvedAccessControl {
    pub requested_policy: AccessPolicy,
    pub achieved_policy: AccessPolicy,
    pub achieved_security_level: SecurityLevel,
    pub native_handle: Option<NativeHandle>,
}

impl ResolvedAccessControl {
    pub fn software(requested_policy: AccessPolicy) -> Self {
        Self {
            requested_policy,
            achieved_policy: AccessPolicy::None,
            achieved_security_level: SecurityLevel::Software,
            native_handle: None,
        }
    }

    pub fn was_downgraded(&self) -> bool {
        self.achieved_policy != self.requested_policy
    }
}

/// Walk the fallback chain from `requested` towards software protection.
///
/// `attempt` returns `Ok(Some(_))` to accept a tier, `Ok(None)` to move on,
/// or an error to stop the walk. Tiers stronger than `requested` are never
/// visited.
pub fn walk_down<T, E>(
    requested: AccessPolicy,
    mut attempt: impl FnMut(AccessPolicy) -> std::result::Result<Option<T>, E>,
) -> std::result::Result<Option<(AccessPolicy, T)>, E> {
    for tier in AccessPolicy::FALLBACK_CHAIN
        .iter()
        .copied()
        .skip(requested.rank())
    {
        if let Some(found) = attempt(tier)? {
            return Ok(Some((tier, found)));
        }
    }
    Ok(None)
}

#[derive(Clone)]
pub struct AccessControlResolver {
    probe: CapabilityProbe,
    platform: Arc<dyn SecurityPlatform>,
}

impl AccessControlResolver {
    pub fn new(platform: Arc<dyn SecurityPlatform>) -> Self {
        Self {
            probe: CapabilityProbe::new(platform.clone()),
            platform,
        }
    }

    pub fn probe(&self) -> &CapabilityProbe {
        &self.probe
    }

    /// Resolve against the capabilities the device has right now
    pub fn resolve(&self, requested: AccessPolicy) -> Result<ResolvedAccessControl> {
        let caps = self.probe.probe()?;
        self.resolve_with(requested, &caps)
    }

    /// Resolve, but refuse to land below `floor`.
    ///
    /// Used when generating a KEK that replaces an already-protected one: a
    /// locked-out sensor must surface as `BiometryLockout` instead of quietly
    /// weakening the new key.
    pub fn resolve_with_floor(
        &self,
        requested: AccessPolicy,
        floor: SecurityLevel,
    ) -> Result<ResolvedAccessControl> {
        let caps = self.probe.probe()?;
        let resolved = self.resolve_with(requested, &caps)?;
        if resolved.achieved_security_level >= floor {
            return Ok(resolved);
        }
        if caps.biometry_locked_out && floor >= SecurityLevel::Biometric {
            return Err(CoreError::BiometryLockout);
        }
        Err(CoreError::KeyGenerationFailed(format!(
            "protection would drop from {floor} to {}",
            resolved.achieved_security_level
        )))
    }

    fn resolve_with(
        &self,
        requested: AccessPolicy,
        caps: &Capabilities,
    ) -> Result<ResolvedAccessControl> {
        let found = walk_down(requested, |tier| {
            if !caps.supports(tier) {
                debug!(?tier, "capability missing, falling back");
                return Ok(None);
            }
            if tier == AccessPolicy::None {
                return Ok(Some(None));
            }
            match self.platform.create_protection(tier) {
                Ok(handle) => Ok(Some(Some(handle))),
                Err(err) if err.is_recoverable() => {
                    debug!(?tier, %err, "protection rejected, falling back");
                    Ok(None)
                }
                Err(err) => Err(CoreError::from(err)),
            }
        })?;

        Ok(match found {
            Some((tier, native_handle)) => ResolvedAccessControl {
                requested_policy: requested,
                achieved_policy: tier,
                achieved_security_level: tier.security_level(),
                native_handle,
            },
            None => ResolvedAccessControl::software(requested),
        })
    }
}
