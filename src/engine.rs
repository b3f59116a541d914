// src/engine.rs
//! Key rotation engine — the public facade
//!
//! Owns the rotation state and wires the collaborators together: capability
//! probe, access-control resolver, key versions, envelope cipher, sweep,
//! orchestrator, enrollment watcher and event bus. The engine is a cheap
//! clonable handle; clones share everything, which is what lets background
//! rotations and the scheduler thread run against the same state.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access_control::AccessControlResolver;
use crate::aliases::SecretValue;
use crate::biometric::{BiometricWatcher, EnrollmentChange};
use crate::capability::Capabilities;
use crate::config::RotationConfig;
use crate::consts::{DEFAULT_NAMESPACE, SETTING_LAST_ROTATION};
use crate::crypto::{decrypt_str, encrypt_to_string};
use crate::enums::{AccessPolicy, RotationEventKind, RotationTrigger};
use crate::error::{CoreError, Result};
use crate::events::{EventBus, RotationEvent, Subscription};
use crate::key_versions::{KeyVersion, KeyVersionManager, PruneReport};
use crate::metadata::StorageItemMetadata;
use crate::platform::{
    AuthContext, AuthPrompt, CancelToken, SecureItemStore, SecurityPlatform, SettingsStore,
};
use crate::rotation::{scheduler, RotationOrchestrator, RotationResult, SchedulerHandle, SweepReport, Sweeper};
use crate::state::SharedRotationState;

/// Where an item lives and how it should be protected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOptions {
    pub namespace: String,
    pub access_policy: AccessPolicy,
    pub prompt: Option<AuthPrompt>,
}

impl Default for ItemOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            access_policy: AccessPolicy::None,
            prompt: None,
        }
    }
}

impl ItemOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }

    pub fn with_prompt(mut self, prompt: AuthPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationStatus {
    pub current_key_version: Option<KeyVersion>,
    pub available_key_versions: Vec<KeyVersion>,
    pub is_rotation_in_progress: bool,
    pub last_rotation_timestamp: Option<DateTime<Utc>>,
}

/// What one scheduler tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub enrollment: EnrollmentChange,
    pub rotation: Option<RotationResult>,
}

struct EngineInner {
    config: RwLock<RotationConfig>,
    state: Arc<SharedRotationState>,
    store: Arc<dyn SecureItemStore>,
    settings: Arc<dyn SettingsStore>,
    resolver: AccessControlResolver,
    versions: Arc<KeyVersionManager>,
    sweeper: Sweeper,
    orchestrator: RotationOrchestrator,
    watcher: BiometricWatcher,
    events: Arc<EventBus>,
    cancel: Mutex<CancelToken>,
}

#[derive(Clone)]
pub struct KeyRotationEngine {
    inner: Arc<EngineInner>,
}

impl KeyRotationEngine {
    /// Engine with default settings overlaid by whatever was persisted
    pub fn new(
        platform: Arc<dyn SecurityPlatform>,
        store: Arc<dyn SecureItemStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        Self::with_config(platform, store, settings, RotationConfig::default())
    }

    /// Engine starting from `base` (typically the TOML config); persisted
    /// scalars from an earlier `initialize_key_rotation` take precedence
    pub fn with_config(
        platform: Arc<dyn SecurityPlatform>,
        store: Arc<dyn SecureItemStore>,
        settings: Arc<dyn SettingsStore>,
        base: RotationConfig,
    ) -> Result<Self> {
        base.validate()?;
        let config = base.load_scalars(settings.as_ref())?;

        let state = Arc::new(SharedRotationState::new());
        if let Some(raw) = settings.get(SETTING_LAST_ROTATION)? {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => state.record_rotation(at.with_timezone(&Utc)),
                Err(err) => warn!(%err, "ignoring unreadable last rotation timestamp"),
            }
        }

        let resolver = AccessControlResolver::new(platform.clone());
        let versions = Arc::new(KeyVersionManager::new(
            store.clone(),
            settings.clone(),
            resolver.clone(),
            state.clone(),
        )?);
        versions.set_invalidate_on_enrollment(config.invalidate_on_enrollment);

        let events = Arc::new(EventBus::new());
        let sweeper = Sweeper::new(store.clone(), versions.clone(), resolver.clone());
        let orchestrator = RotationOrchestrator::new(
            state.clone(),
            versions.clone(),
            sweeper.clone(),
            events.clone(),
            settings.clone(),
        );
        let watcher = BiometricWatcher::new(platform, settings.clone())?;

        debug!(backend = ?store.backend(), "key rotation engine ready");
        Ok(Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(config),
                state,
                store,
                settings,
                resolver,
                versions,
                sweeper,
                orchestrator,
                watcher,
                events,
                cancel: Mutex::new(CancelToken::new()),
            }),
        })
    }

    pub fn config(&self) -> RotationConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn auth_context(&self, prompt: Option<AuthPrompt>) -> AuthContext {
        let cancel = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        AuthContext::new(prompt, cancel)
    }

    /// Apply and persist rotation settings. Also records the enrollment
    /// baseline the first time.
    pub fn initialize_key_rotation(&self, config: RotationConfig) -> Result<()> {
        config.validate()?;
        config.store_scalars(self.inner.settings.as_ref())?;
        self.inner
            .versions
            .set_invalidate_on_enrollment(config.invalidate_on_enrollment);
        if !self.inner.watcher.has_baseline() {
            self.inner.watcher.check_for_change()?;
        }
        info!(
            enabled = config.enabled,
            interval_ms = config.rotation_interval_ms,
            max_versions = config.max_key_versions,
            "key rotation initialized"
        );
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Manual rotation
    pub fn rotate_keys(&self, reason: Option<&str>) -> Result<RotationResult> {
        self.rotate_with(RotationTrigger::Manual, reason)
    }

    fn rotate_with(&self, trigger: RotationTrigger, reason: Option<&str>) -> Result<RotationResult> {
        let config = self.config();
        let auth = self.auth_context(None);
        self.inner.orchestrator.rotate(trigger, reason, &config, &auth)
    }

    pub fn get_rotation_status(&self) -> RotationStatus {
        let snapshot = self.inner.state.snapshot();
        RotationStatus {
            current_key_version: snapshot
                .current_key_version_id
                .as_deref()
                .and_then(|id| self.inner.versions.get(id)),
            available_key_versions: self.inner.versions.list_versions(),
            is_rotation_in_progress: snapshot.is_rotation_in_progress,
            last_rotation_timestamp: snapshot.last_rotation_timestamp,
        }
    }

    pub fn on_rotation_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RotationEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(callback)
    }

    /// Migrate every item of `namespace` to the current key version.
    /// Creates the first key version if there is none yet.
    pub fn re_encrypt_all_items(
        &self,
        namespace: &str,
        batch_size: Option<usize>,
    ) -> Result<SweepReport> {
        let config = self.config();
        let current = self
            .inner
            .versions
            .ensure_current(config.key_requires_biometry)?;
        let auth = self.auth_context(None);
        let kek = self.inner.versions.retrieve(&current.id, &auth)?;
        self.inner.sweeper.run(
            namespace,
            &current,
            &kek,
            batch_size.unwrap_or(config.sweep_batch_size),
            &auth,
        )
    }

    /// Encrypt `value` under the current key version and store it
    pub fn set_item(&self, key: &str, value: &str, options: &ItemOptions) -> Result<StorageItemMetadata> {
        let config = self.config();
        let current = self
            .inner
            .versions
            .ensure_current(config.key_requires_biometry)?;
        let auth = self.auth_context(options.prompt.clone());
        let kek = self.inner.versions.retrieve(&current.id, &auth)?;

        let resolved = self.inner.resolver.resolve(options.access_policy)?;
        let encrypted = encrypt_to_string(value.as_bytes(), &kek)?;
        let metadata = StorageItemMetadata::new(&resolved, self.inner.store.backend(), &current.id);
        self.inner
            .store
            .update(key, &options.namespace, &encrypted, &metadata)?;

        debug!(key, namespace = %options.namespace, version = %current.id, "item stored");
        Ok(metadata)
    }

    /// Decrypt an item with whichever key version wrote it
    pub fn get_item(&self, key: &str, options: &ItemOptions) -> Result<Option<SecretValue>> {
        let Some(item) = self.inner.store.get_raw(key, &options.namespace)? else {
            return Ok(None);
        };
        let version = &item.metadata.key_version_id;
        if !self.inner.versions.contains(version) {
            return Err(CoreError::UnresolvableKeyVersion {
                key: key.to_owned(),
                version: version.clone(),
            });
        }

        let auth = self.auth_context(options.prompt.clone());
        let kek = self.inner.versions.retrieve(version, &auth)?;
        let plaintext = decrypt_str(&item.encrypted_value, &kek)?;
        let text = String::from_utf8(plaintext.expose_secret().to_vec())
            .map_err(|_| CoreError::DecryptionFailed)?;
        Ok(Some(SecretValue::new(text)))
    }

    /// Returns whether an item was removed
    pub fn delete_item(&self, key: &str, options: &ItemOptions) -> Result<bool> {
        Ok(self.inner.store.delete(key, &options.namespace)?)
    }

    /// Compare enrollment with the last snapshot. On a change, emit
    /// `biometric-changed` and, when configured, start a rotation on a
    /// background thread. That rotation reports through events only.
    pub fn check_biometric_change(&self) -> Result<EnrollmentChange> {
        let change = self.observe_enrollment()?;
        if let Some(trigger) = self.rotation_trigger_for(&change) {
            let engine = self.clone();
            let spawned = thread::Builder::new()
                .name("key-rotation-background".into())
                .spawn(move || {
                    if let Err(err) = engine.rotate_with(trigger, None) {
                        warn!(%err, ?trigger, "background rotation did not complete");
                    }
                });
            if let Err(err) = spawned {
                warn!(%err, "could not start background rotation");
            }
        }
        Ok(change)
    }

    fn observe_enrollment(&self) -> Result<EnrollmentChange> {
        let change = self.inner.watcher.check_for_change()?;
        if change.changed {
            self.inner.events.emit(&RotationEvent::new(
                RotationEventKind::BiometricChanged,
                RotationTrigger::BiometricChange.default_reason(),
            ));
        }
        Ok(change)
    }

    fn rotation_trigger_for(&self, change: &EnrollmentChange) -> Option<RotationTrigger> {
        let config = self.config();
        if !config.enabled {
            return None;
        }
        if change.changed && config.rotate_on_biometric_change {
            Some(RotationTrigger::BiometricChange)
        } else if change.credential_changed && config.rotate_on_credential_change {
            Some(RotationTrigger::CredentialChange)
        } else {
            None
        }
    }

    /// Whether time-based rotation is due at `now`. Without a previous
    /// rotation the age of the current key counts.
    pub fn is_rotation_due(&self, now: DateTime<Utc>) -> bool {
        let Some(interval) = self.config().rotation_interval() else {
            return false;
        };
        let since = self
            .inner
            .state
            .last_rotation_timestamp()
            .or_else(|| self.inner.versions.current().map(|v| v.generated_at));
        match (since, ChronoDuration::from_std(interval)) {
            (Some(since), Ok(interval)) => now - since >= interval,
            _ => false,
        }
    }

    /// One scheduler step: enrollment check, then a rotation if one is
    /// triggered or due. Runs the rotation on the calling thread.
    pub fn tick(&self) -> Result<TickOutcome> {
        let enrollment = self.observe_enrollment()?;
        let trigger = self.rotation_trigger_for(&enrollment).or_else(|| {
            self.is_rotation_due(Utc::now())
                .then_some(RotationTrigger::Scheduled)
        });

        let rotation = match trigger {
            Some(trigger) => match self.rotate_with(trigger, None) {
                Ok(result) => Some(result),
                Err(CoreError::RotationAlreadyInProgress) => {
                    debug!("tick skipped, rotation already running");
                    None
                }
                Err(err) => return Err(err),
            },
            None => None,
        };
        Ok(TickOutcome {
            enrollment,
            rotation,
        })
    }

    /// Run [`Self::tick`] periodically until the handle is stopped or dropped
    pub fn start_scheduler(&self) -> Result<SchedulerHandle> {
        let period = self.config().check_interval();
        let engine = self.clone();
        scheduler::spawn(period, move || {
            if let Err(err) = engine.tick() {
                warn!(%err, "scheduled check failed");
            }
        })
    }

    pub fn is_sensor_available(&self) -> Result<bool> {
        self.inner.resolver.probe().is_sensor_available()
    }

    pub fn capabilities(&self) -> Result<Capabilities> {
        self.inner.resolver.probe().probe()
    }

    /// Cancel every authentication in flight. Later operations get a fresh token.
    pub fn cancel_authentication(&self) {
        let mut cancel = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cancel.cancel();
        *cancel = CancelToken::new();
        info!("authentication canceled");
    }

    /// Drop key versions beyond `max_key_versions` that nothing references
    pub fn prune_key_versions(&self) -> Result<PruneReport> {
        self.inner.versions.prune(self.config().max_key_versions)
    }

    /// Delete one key version; refused while it is current or referenced
    pub fn delete_key_version(&self, version_id: &str) -> Result<()> {
        self.inner.versions.delete_version(version_id)
    }
}
