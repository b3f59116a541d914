// src/platform/mod.rs
//! External collaborators of the engine
//!
//! The engine never talks to a keychain, keystore or preferences file
//! directly. It goes through the three traits below, and every error they
//! report is a [`PlatformError`] mapped into the crate taxonomy at the call
//! site.
//!
//! Implementations shipped with the crate:
//! - [`software::SoftwarePlatform`]: no hardware tiers, used by the CLI
//! - [`memory`]: in-memory store and settings, plus a scriptable device
//! - [`sqlite::SqliteItemStore`]: everything in one SQLCipher database

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::access_control::ResolvedAccessControl;
use crate::aliases::Kek32;
use crate::capability::Capabilities;
use crate::enums::{AccessPolicy, Backend, BiometryType};
use crate::error::PlatformError;
use crate::metadata::StorageItemMetadata;

pub mod auth;
pub mod memory;
pub mod software;
pub mod sqlite;

pub use auth::{AuthContext, AuthPrompt, CancelToken};

/// Opaque reference to a platform protection object (access-control
/// object, key-generation parameters, ...). Absent for software protection.
#[derive(Clone)]
pub struct NativeHandle(Arc<dyn Any + Send + Sync>);

impl NativeHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeHandle(..)")
    }
}

/// What the device reports about its biometric and credential enrollment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSnapshot {
    pub biometry: BiometryType,
    /// Opaque token that changes whenever the enrolled set changes, when the
    /// platform exposes one
    pub domain_state: Option<String>,
    pub device_credential_set: bool,
}

/// One stored item as the secure item store returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub key: String,
    pub namespace: String,
    pub encrypted_value: String,
    pub metadata: StorageItemMetadata,
}

/// Device security queries and protection-object construction
pub trait SecurityPlatform: Send + Sync {
    fn capabilities(&self) -> Result<Capabilities, PlatformError>;

    fn enrollment(&self) -> Result<EnrollmentSnapshot, PlatformError>;

    /// Build (but do not persist) the protection object for `policy`.
    /// Returns [`PlatformError::Rejected`] when the OS refuses the parameters.
    fn create_protection(&self, policy: AccessPolicy) -> Result<NativeHandle, PlatformError>;
}

/// Persistence of encrypted items and KEK material
pub trait SecureItemStore: Send + Sync {
    fn backend(&self) -> Backend;

    fn get_all_raw(&self, namespace: &str) -> Result<Vec<RawItem>, PlatformError>;

    /// Key version ids referenced by any stored item, in every namespace
    fn referenced_key_versions(&self) -> Result<BTreeSet<String>, PlatformError>;

    fn get_raw(&self, key: &str, namespace: &str) -> Result<Option<RawItem>, PlatformError>;

    /// Insert or replace an item
    fn update(
        &self,
        key: &str,
        namespace: &str,
        encrypted_value: &str,
        metadata: &StorageItemMetadata,
    ) -> Result<(), PlatformError>;

    /// Returns whether an item was removed
    fn delete(&self, key: &str, namespace: &str) -> Result<bool, PlatformError>;

    fn store_key_material(
        &self,
        version_id: &str,
        material: &Kek32,
        protection: &ResolvedAccessControl,
    ) -> Result<(), PlatformError>;

    /// May block on a biometric or passcode prompt
    fn retrieve_key_material(
        &self,
        version_id: &str,
        auth: &AuthContext,
    ) -> Result<Kek32, PlatformError>;

    fn delete_key_material(&self, version_id: &str) -> Result<(), PlatformError>;
}

/// Process-wide scalar settings (external key-value store)
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError>;

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError>;

    fn remove(&self, key: &str) -> Result<(), PlatformError>;
}
