// src/key_versions.rs
//! Key version manager
//!
//! Generates, persists, enumerates and deletes KEKs identified by version
//! ids, and tracks which version is current. Key material lives in the
//! secure item store; the descriptors ([`KeyVersion`]) live as JSON in the
//! settings store so they survive restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::access_control::AccessControlResolver;
use crate::aliases::Kek32;
use crate::consts::{SETTING_CURRENT_VERSION, SETTING_KEY_VERSIONS};
use crate::enums::{AccessPolicy, CipherAlgorithm, SecurityLevel};
use crate::error::{CoreError, PlatformError, Result};
use crate::key_ops::{fingerprint, generate_kek, next_version_id};
use crate::platform::{AuthContext, SecureItemStore, SettingsStore};
use crate::state::SharedRotationState;

/// Descriptor of one KEK. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersion {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub algorithm: CipherAlgorithm,
    pub requires_biometry: bool,
    pub security_level: SecurityLevel,
    pub fingerprint: String,
}

/// Outcome of [`KeyVersionManager::prune`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub deleted: Vec<String>,
    /// Versions past the retention limit kept because items or the current
    /// pointer still reference them
    pub retained_in_use: Vec<String>,
}

pub struct KeyVersionManager {
    store: Arc<dyn SecureItemStore>,
    settings: Arc<dyn SettingsStore>,
    resolver: AccessControlResolver,
    state: Arc<SharedRotationState>,
    registry: Mutex<BTreeMap<String, KeyVersion>>,
    invalidate_on_enrollment: AtomicBool,
    /// Serialises id allocation and KEK creation
    creation: Mutex<()>,
}

impl KeyVersionManager {
    /// Load persisted descriptors and publish them into `state`
    pub fn new(
        store: Arc<dyn SecureItemStore>,
        settings: Arc<dyn SettingsStore>,
        resolver: AccessControlResolver,
        state: Arc<SharedRotationState>,
    ) -> Result<Self> {
        let registry: BTreeMap<String, KeyVersion> = match settings.get(SETTING_KEY_VERSIONS)? {
            Some(json) => serde_json::from_str::<Vec<KeyVersion>>(&json)?
                .into_iter()
                .map(|v| (v.id.clone(), v))
                .collect(),
            None => BTreeMap::new(),
        };

        for id in registry.keys() {
            state.add_available(id);
        }
        if let Some(current) = settings.get(SETTING_CURRENT_VERSION)? {
            if registry.contains_key(&current) {
                state.set_current(&current);
            } else {
                warn!(version = %current, "persisted current key version is unknown, ignoring");
            }
        }

        debug!(versions = registry.len(), "key version registry loaded");

        Ok(Self {
            store,
            settings,
            resolver,
            state,
            registry: Mutex::new(registry),
            invalidate_on_enrollment: AtomicBool::new(true),
            creation: Mutex::new(()),
        })
    }

    fn registry(&self) -> MutexGuard<'_, BTreeMap<String, KeyVersion>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn creation(&self) -> MutexGuard<'_, ()> {
        self.creation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Biometric KEKs created from now on are (or are not) invalidated by
    /// enrollment changes
    pub fn set_invalidate_on_enrollment(&self, invalidate: bool) {
        self.invalidate_on_enrollment
            .store(invalidate, Ordering::SeqCst);
    }

    /// Policy requested for new KEK storage
    pub fn policy_for(&self, requires_biometry: bool) -> AccessPolicy {
        match (
            requires_biometry,
            self.invalidate_on_enrollment.load(Ordering::SeqCst),
        ) {
            (true, true) => AccessPolicy::BiometryCurrentSet,
            (true, false) => AccessPolicy::BiometryAny,
            (false, _) => AccessPolicy::None,
        }
    }

    /// Id for the next KEK; always sorts after every existing version
    pub fn next_version_id(&self) -> String {
        let registry = self.registry();
        next_version_id(Utc::now(), registry.keys().next_back().map(String::as_str))
    }

    /// Create 256-bit key material, persist it under `version_id` with a
    /// resolved protection, and record its descriptor
    pub fn generate(&self, version_id: &str, requires_biometry: bool) -> Result<Kek32> {
        self.generate_with_floor(version_id, requires_biometry, None)
            .map(|(kek, _)| kek)
    }

    /// Like [`Self::generate`], but the KEK storage may not resolve below `floor`
    pub fn generate_with_floor(
        &self,
        version_id: &str,
        requires_biometry: bool,
        floor: Option<SecurityLevel>,
    ) -> Result<(Kek32, KeyVersion)> {
        let _creation = self.creation();
        self.create(version_id, requires_biometry, floor)
    }

    /// Allocate a fresh id, create its KEK and make it current, as one step
    /// with respect to every other KEK creation
    pub fn generate_current(
        &self,
        requires_biometry: bool,
        floor: Option<SecurityLevel>,
    ) -> Result<(Kek32, KeyVersion)> {
        let _creation = self.creation();
        let id = self.next_version_id();
        let created = self.create(&id, requires_biometry, floor)?;
        self.set_current(&id)?;
        Ok(created)
    }

    /// Caller holds the creation lock
    fn create(
        &self,
        version_id: &str,
        requires_biometry: bool,
        floor: Option<SecurityLevel>,
    ) -> Result<(Kek32, KeyVersion)> {
        if self.contains(version_id) {
            return Err(CoreError::KeyGenerationFailed(format!(
                "key version `{version_id}` already exists"
            )));
        }

        let policy = self.policy_for(requires_biometry);
        let resolved = match floor {
            Some(floor) => self.resolver.resolve_with_floor(policy, floor)?,
            None => self.resolver.resolve(policy)?,
        };

        let kek = generate_kek();
        self.store
            .store_key_material(version_id, &kek, &resolved)
            .map_err(|err| match err {
                PlatformError::Lockout => CoreError::BiometryLockout,
                PlatformError::Canceled => CoreError::AuthenticationCanceled,
                other => CoreError::KeyGenerationFailed(other.to_string()),
            })?;

        let version = KeyVersion {
            id: version_id.to_owned(),
            generated_at: Utc::now(),
            algorithm: CipherAlgorithm::Aes256CbcPkcs7,
            requires_biometry: resolved.achieved_security_level.requires_authentication(),
            security_level: resolved.achieved_security_level,
            fingerprint: fingerprint(&kek),
        };

        {
            let mut registry = self.registry();
            registry.insert(version.id.clone(), version.clone());
            if let Err(err) = self.persist(&registry) {
                registry.remove(version_id);
                drop(registry);
                if let Err(cleanup) = self.store.delete_key_material(version_id) {
                    warn!(version = %version_id, %cleanup, "could not remove orphaned key material");
                }
                return Err(CoreError::KeyGenerationFailed(err.to_string()));
            }
        }
        self.state.add_available(version_id);

        info!(
            version = %version.id,
            level = %version.security_level,
            downgraded = resolved.was_downgraded(),
            "generated key version"
        );
        Ok((kek, version))
    }

    /// Fetch a KEK, driving the platform prompt when its storage is protected
    pub fn retrieve(&self, version_id: &str, auth: &AuthContext) -> Result<Kek32> {
        let expected = self
            .get(version_id)
            .ok_or_else(|| CoreError::KeyNotFound(version_id.to_owned()))?;
        auth.ensure_not_cancelled()?;

        let kek = self
            .store
            .retrieve_key_material(version_id, auth)
            .map_err(|err| match err {
                PlatformError::NotFound => CoreError::KeyNotFound(version_id.to_owned()),
                PlatformError::KeyPermanentlyInvalidated => {
                    CoreError::KeyInvalidated(version_id.to_owned())
                }
                other => other.into(),
            })?;

        if fingerprint(&kek) != expected.fingerprint {
            warn!(version = %version_id, "key material does not match its descriptor");
            return Err(CoreError::KeyInvalidated(version_id.to_owned()));
        }
        Ok(kek)
    }

    /// Point new writes at `version_id`. Existing ciphertext is untouched.
    pub fn set_current(&self, version_id: &str) -> Result<()> {
        if !self.contains(version_id) {
            return Err(CoreError::KeyNotFound(version_id.to_owned()));
        }
        self.settings.set(SETTING_CURRENT_VERSION, version_id)?;
        self.state.set_current(version_id);
        Ok(())
    }

    /// Current version, creating and promoting the first KEK on first use
    pub fn ensure_current(&self, requires_biometry: bool) -> Result<KeyVersion> {
        let _creation = self.creation();
        if let Some(current) = self.current() {
            return Ok(current);
        }
        let id = self.next_version_id();
        let (_, version) = self.create(&id, requires_biometry, None)?;
        self.set_current(&id)?;
        info!(version = %id, "created initial key version");
        Ok(version)
    }

    pub fn current(&self) -> Option<KeyVersion> {
        let id = self.state.current_key_version_id()?;
        self.get(&id)
    }

    pub fn get(&self, version_id: &str) -> Option<KeyVersion> {
        self.registry().get(version_id).cloned()
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.registry().contains_key(version_id)
    }

    /// All versions, oldest first
    pub fn list_versions(&self) -> Vec<KeyVersion> {
        self.registry().values().cloned().collect()
    }

    /// Every key version id referenced by a stored item, whatever its namespace
    pub fn referenced_versions(&self) -> Result<BTreeSet<String>> {
        Ok(self.store.referenced_key_versions()?)
    }

    /// Delete one version. Refused while the version is current or still
    /// referenced by an item: that would leave undecryptable data behind.
    pub fn delete_version(&self, version_id: &str) -> Result<()> {
        if !self.contains(version_id) {
            return Err(CoreError::KeyNotFound(version_id.to_owned()));
        }
        let referenced = self.referenced_versions()?;
        if self.is_pinned(version_id, &referenced) {
            return Err(CoreError::KeyVersionInUse(version_id.to_owned()));
        }
        self.remove(version_id)
    }

    /// Delete the oldest versions beyond `max_retained`, skipping any that
    /// are current or referenced by a stored item
    pub fn prune(&self, max_retained: usize) -> Result<PruneReport> {
        let max_retained = max_retained.max(1);
        let ids: Vec<String> = self.registry().keys().cloned().collect();
        let mut report = PruneReport::default();
        if ids.len() <= max_retained {
            return Ok(report);
        }

        let referenced = self.referenced_versions()?;
        let excess = ids.len() - max_retained;
        for id in ids.into_iter().take(excess) {
            if self.is_pinned(&id, &referenced) {
                debug!(version = %id, "keeping referenced key version");
                report.retained_in_use.push(id);
                continue;
            }
            self.remove(&id)?;
            report.deleted.push(id);
        }

        if !report.deleted.is_empty() {
            info!(deleted = report.deleted.len(), kept = report.retained_in_use.len(), "pruned key versions");
        }
        Ok(report)
    }

    fn is_pinned(&self, version_id: &str, referenced: &BTreeSet<String>) -> bool {
        referenced.contains(version_id)
            || self.state.current_key_version_id().as_deref() == Some(version_id)
    }

    fn remove(&self, version_id: &str) -> Result<()> {
        match self.store.delete_key_material(version_id) {
            Ok(()) | Err(PlatformError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        let mut registry = self.registry();
        registry.remove(version_id);
        self.persist(&registry)?;
        drop(registry);
        self.state.remove_available(version_id);
        Ok(())
    }

    fn persist(&self, registry: &BTreeMap<String, KeyVersion>) -> Result<()> {
        let versions: Vec<&KeyVersion> = registry.values().collect();
        let json = serde_json::to_string(&versions)?;
        self.settings.set(SETTING_KEY_VERSIONS, &json)?;
        Ok(())
    }
}
