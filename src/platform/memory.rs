// src/platform/memory.rs
//! In-memory collaborators
//!
//! [`SimulatedDevice`] behaves like a phone whose security state can be
//! scripted: capabilities, enrollment changes, lockout, rejected protection
//! parameters and failing prompts. [`MemoryItemStore`] enforces the
//! protection it was given against that device, including permanent
//! invalidation of enrollment-bound keys.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::access_control::ResolvedAccessControl;
use crate::aliases::Kek32;
use crate::capability::Capabilities;
use crate::enums::{AccessPolicy, Backend, BiometryType, SecurityLevel};
use crate::error::PlatformError;
use crate::metadata::StorageItemMetadata;

use super::{
    AuthContext, EnrollmentSnapshot, NativeHandle, RawItem, SecureItemStore, SecurityPlatform,
    SettingsStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Protection object handed out by [`SimulatedDevice::create_protection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedProtection {
    pub policy: AccessPolicy,
    pub enrollment_epoch: u64,
}

#[derive(Debug)]
struct DeviceState {
    capabilities: Capabilities,
    enrollment: EnrollmentSnapshot,
    rejected: HashSet<AccessPolicy>,
    pending_failures: VecDeque<PlatformError>,
    enrollment_epoch: u64,
    authentications: usize,
}

#[derive(Debug)]
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    pub fn new(capabilities: Capabilities) -> Self {
        let enrollment = EnrollmentSnapshot {
            biometry: if capabilities.biometric {
                BiometryType::Fingerprint
            } else {
                BiometryType::None
            },
            domain_state: capabilities.biometric.then(|| domain_state(0)),
            device_credential_set: capabilities.device_credential,
        };
        Self {
            state: Mutex::new(DeviceState {
                capabilities,
                enrollment,
                rejected: HashSet::new(),
                pending_failures: VecDeque::new(),
                enrollment_epoch: 0,
                authentications: 0,
            }),
        }
    }

    /// No secure hardware, no biometry, no passcode
    pub fn software_only() -> Self {
        Self::new(Capabilities::default())
    }

    /// Secure element, enrolled fingerprint and a passcode
    pub fn full_hardware() -> Self {
        Self::new(Capabilities {
            hardware_isolated: true,
            biometric: true,
            device_credential: true,
            biometry_locked_out: false,
        })
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        lock(&self.state).capabilities = capabilities;
    }

    pub fn set_device_credential(&self, set: bool) {
        let mut state = lock(&self.state);
        state.capabilities.device_credential = set;
        state.enrollment.device_credential_set = set;
    }

    /// Too many failed attempts: biometry is unusable until [`Self::clear_lockout`]
    pub fn lock_out_biometry(&self) {
        let mut state = lock(&self.state);
        state.capabilities.biometry_locked_out = true;
        state.capabilities.biometric = false;
    }

    pub fn clear_lockout(&self) {
        let mut state = lock(&self.state);
        state.capabilities.biometry_locked_out = false;
        state.capabilities.biometric = state.enrollment.biometry != BiometryType::None;
    }

    /// Replace the enrolled biometric set. Keys bound to the previous set
    /// become permanently invalid.
    pub fn enroll(&self, biometry: BiometryType) {
        let mut state = lock(&self.state);
        state.enrollment_epoch += 1;
        let epoch = state.enrollment_epoch;
        state.enrollment.biometry = biometry;
        state.enrollment.domain_state = (biometry != BiometryType::None).then(|| domain_state(epoch));
        state.capabilities.biometric =
            biometry != BiometryType::None && !state.capabilities.biometry_locked_out;
    }

    /// The OS refuses protection objects for `policy`
    pub fn reject_policy(&self, policy: AccessPolicy) {
        lock(&self.state).rejected.insert(policy);
    }

    /// Queue the outcome of the next prompt
    pub fn fail_next_authentication(&self, error: PlatformError) {
        lock(&self.state).pending_failures.push_back(error);
    }

    /// Prompts shown so far
    pub fn authentication_count(&self) -> usize {
        lock(&self.state).authentications
    }

    pub fn enrollment_epoch(&self) -> u64 {
        lock(&self.state).enrollment_epoch
    }

    /// Show a prompt for material protected at `level`
    pub fn authenticate(&self, level: SecurityLevel, auth: &AuthContext) -> Result<(), PlatformError> {
        auth.ensure_not_cancelled()?;
        let mut state = lock(&self.state);
        state.authentications += 1;
        if let Some(err) = state.pending_failures.pop_front() {
            return Err(err);
        }
        if level >= SecurityLevel::Biometric && state.capabilities.biometry_locked_out {
            return Err(PlatformError::Lockout);
        }
        Ok(())
    }
}

fn domain_state(epoch: u64) -> String {
    format!("simulated-enrollment-{epoch}")
}

impl SecurityPlatform for SimulatedDevice {
    fn capabilities(&self) -> Result<Capabilities, PlatformError> {
        Ok(lock(&self.state).capabilities)
    }

    fn enrollment(&self) -> Result<EnrollmentSnapshot, PlatformError> {
        Ok(lock(&self.state).enrollment.clone())
    }

    fn create_protection(&self, policy: AccessPolicy) -> Result<NativeHandle, PlatformError> {
        let state = lock(&self.state);
        if state.rejected.contains(&policy) {
            return Err(PlatformError::Rejected(format!("{policy:?} refused by device")));
        }
        Ok(NativeHandle::new(SimulatedProtection {
            policy,
            enrollment_epoch: state.enrollment_epoch,
        }))
    }
}

struct StoredKey {
    material: Kek32,
    level: SecurityLevel,
    policy: AccessPolicy,
    enrollment_epoch: u64,
}

impl StoredKey {
    fn bound_to_enrollment(&self) -> bool {
        matches!(
            self.policy,
            AccessPolicy::BiometryCurrentSet | AccessPolicy::HardwareBiometric
        )
    }
}

const CORRUPT_ENVELOPE: &str = "AAAAAAAAAAAAAAAAAAAAAA==]AAAAAAAAAAAAAAAAAAAAAA==]\
AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Secure item store kept in process memory
#[derive(Default)]
pub struct MemoryItemStore {
    device: Option<Arc<SimulatedDevice>>,
    items: Mutex<BTreeMap<(String, String), RawItem>>,
    keys: Mutex<BTreeMap<String, StoredKey>>,
}

impl MemoryItemStore {
    /// Store without a device: key material is never gated
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose protected key material is released through `device`
    pub fn with_device(device: Arc<SimulatedDevice>) -> Self {
        Self {
            device: Some(device),
            ..Self::default()
        }
    }

    /// Overwrite the stored ciphertext of an item, keeping its metadata.
    /// The replacement carries a tag no KEK produces.
    pub fn corrupt_item(&self, key: &str, namespace: &str) -> bool {
        match lock(&self.items).get_mut(&(namespace.to_owned(), key.to_owned())) {
            Some(item) => {
                item.encrypted_value = CORRUPT_ENVELOPE.into();
                true
            }
            None => false,
        }
    }

    /// Place an item exactly as given, bypassing the engine
    pub fn insert_raw(&self, item: RawItem) {
        lock(&self.items).insert((item.namespace.clone(), item.key.clone()), item);
    }

    pub fn item(&self, key: &str, namespace: &str) -> Option<RawItem> {
        lock(&self.items)
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn item_count(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn key_material_count(&self) -> usize {
        lock(&self.keys).len()
    }

    /// Level the material for `version_id` was stored at
    pub fn key_level(&self, version_id: &str) -> Option<SecurityLevel> {
        lock(&self.keys).get(version_id).map(|k| k.level)
    }
}

impl SecureItemStore for MemoryItemStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn get_all_raw(&self, namespace: &str) -> Result<Vec<RawItem>, PlatformError> {
        Ok(lock(&self.items)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, item)| item.clone())
            .collect())
    }

    fn referenced_key_versions(&self) -> Result<BTreeSet<String>, PlatformError> {
        Ok(lock(&self.items)
            .values()
            .map(|item| item.metadata.key_version_id.clone())
            .collect())
    }

    fn get_raw(&self, key: &str, namespace: &str) -> Result<Option<RawItem>, PlatformError> {
        Ok(self.item(key, namespace))
    }

    fn update(
        &self,
        key: &str,
        namespace: &str,
        encrypted_value: &str,
        metadata: &StorageItemMetadata,
    ) -> Result<(), PlatformError> {
        self.insert_raw(RawItem {
            key: key.to_owned(),
            namespace: namespace.to_owned(),
            encrypted_value: encrypted_value.to_owned(),
            metadata: metadata.clone(),
        });
        Ok(())
    }

    fn delete(&self, key: &str, namespace: &str) -> Result<bool, PlatformError> {
        Ok(lock(&self.items)
            .remove(&(namespace.to_owned(), key.to_owned()))
            .is_some())
    }

    fn store_key_material(
        &self,
        version_id: &str,
        material: &Kek32,
        protection: &ResolvedAccessControl,
    ) -> Result<(), PlatformError> {
        let enrollment_epoch = protection
            .native_handle
            .as_ref()
            .and_then(|h| h.downcast_ref::<SimulatedProtection>())
            .map(|p| p.enrollment_epoch)
            .or_else(|| self.device.as_ref().map(|d| d.enrollment_epoch()))
            .unwrap_or_default();

        lock(&self.keys).insert(
            version_id.to_owned(),
            StoredKey {
                material: Kek32::new(*material.expose_secret()),
                level: protection.achieved_security_level,
                policy: protection.achieved_policy,
                enrollment_epoch,
            },
        );
        Ok(())
    }

    fn retrieve_key_material(
        &self,
        version_id: &str,
        auth: &AuthContext,
    ) -> Result<Kek32, PlatformError> {
        auth.ensure_not_cancelled()?;
        let (level, copy) = {
            let keys = lock(&self.keys);
            let stored = keys.get(version_id).ok_or(PlatformError::NotFound)?;
            if let Some(device) = &self.device {
                if stored.bound_to_enrollment()
                    && stored.enrollment_epoch != device.enrollment_epoch()
                {
                    return Err(PlatformError::KeyPermanentlyInvalidated);
                }
            }
            (stored.level, Kek32::new(*stored.material.expose_secret()))
        };

        // Prompt outside the lock: it may block on the user
        if let Some(device) = &self.device {
            if level.requires_authentication() {
                device.authenticate(level, auth)?;
            }
        }
        Ok(copy)
    }

    fn delete_key_material(&self, version_id: &str) -> Result<(), PlatformError> {
        lock(&self.keys)
            .remove(version_id)
            .map(|_| ())
            .ok_or(PlatformError::NotFound)
    }
}

/// Settings store kept in process memory
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.values).clone()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        lock(&self.values).insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PlatformError> {
        lock(&self.values).remove(key);
        Ok(())
    }
}
