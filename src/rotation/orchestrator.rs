// src/rotation/orchestrator.rs
//! Rotation state machine
//!
//! Idle → Rotating happens only through [`SharedRotationState::try_begin`];
//! the guard it returns is held until the `completed` or `failed` event has
//! been emitted, then dropped on every exit path.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RotationConfig;
use crate::consts::SETTING_LAST_ROTATION;
use crate::enums::{RotationEventKind, RotationTrigger};
use crate::error::{CoreError, ItemError, Result};
use crate::events::{EventBus, RotationEvent};
use crate::key_versions::{KeyVersion, KeyVersionManager, PruneReport};
use crate::platform::{AuthContext, SettingsStore};
use crate::state::SharedRotationState;

use super::sweep::{SweepReport, Sweeper};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub success: bool,
    pub new_key_version: KeyVersion,
    pub items_re_encrypted: usize,
    pub duration_ms: u64,
    pub reason: String,
    /// Items the sweep could not migrate; they stay readable on their old version
    pub errors: Vec<ItemError>,
    pub pruned: PruneReport,
}

pub struct RotationOrchestrator {
    state: Arc<SharedRotationState>,
    versions: Arc<KeyVersionManager>,
    sweeper: Sweeper,
    events: Arc<EventBus>,
    settings: Arc<dyn SettingsStore>,
}

impl RotationOrchestrator {
    pub fn new(
        state: Arc<SharedRotationState>,
        versions: Arc<KeyVersionManager>,
        sweeper: Sweeper,
        events: Arc<EventBus>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            state,
            versions,
            sweeper,
            events,
            settings,
        }
    }

    pub fn rotate(
        &self,
        trigger: RotationTrigger,
        reason: Option<&str>,
        config: &RotationConfig,
        auth: &AuthContext,
    ) -> Result<RotationResult> {
        match trigger {
            RotationTrigger::Manual if !config.manual_rotation_enabled => {
                return Err(CoreError::RotationDisabled("manual rotation is turned off"));
            }
            RotationTrigger::Manual => {}
            _ if !config.enabled => {
                return Err(CoreError::RotationDisabled("automatic rotation is turned off"));
            }
            _ => {}
        }
        let reason = reason
            .map(str::to_owned)
            .unwrap_or_else(|| trigger.default_reason().to_owned());

        let _guard = self.state.try_begin()?;
        let started = Instant::now();
        info!(?trigger, %reason, "key rotation started");
        self.events
            .emit(&RotationEvent::new(RotationEventKind::Started, &reason));

        match self.run(config, auth) {
            Ok((version, sweep, pruned)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    version = %version.id,
                    migrated = sweep.items_re_encrypted,
                    failed = sweep.errors.len(),
                    duration_ms,
                    "key rotation completed"
                );
                self.events.emit(
                    &RotationEvent::new(RotationEventKind::Completed, &reason)
                        .with_items(sweep.items_re_encrypted)
                        .with_duration_ms(duration_ms)
                        .with_key_version(&version.id),
                );
                Ok(RotationResult {
                    success: true,
                    new_key_version: version,
                    items_re_encrypted: sweep.items_re_encrypted,
                    duration_ms,
                    reason,
                    errors: sweep.errors,
                    pruned,
                })
            }
            Err(err) => {
                warn!(%err, %reason, "key rotation failed");
                self.events.emit(
                    &RotationEvent::new(RotationEventKind::Failed, format!("{reason}: {err}"))
                        .with_duration_ms(started.elapsed().as_millis() as u64),
                );
                Err(err)
            }
        }
    }

    fn run(
        &self,
        config: &RotationConfig,
        auth: &AuthContext,
    ) -> Result<(KeyVersion, SweepReport, PruneReport)> {
        // A replacement key may not be weaker than the one it replaces,
        // unless the configuration itself asks for less
        let requested = self
            .versions
            .policy_for(config.key_requires_biometry)
            .security_level();
        let floor = self
            .versions
            .current()
            .map(|previous| previous.security_level.min(requested));

        let (kek, version) = self
            .versions
            .generate_current(config.key_requires_biometry, floor)?;

        let mut sweep = SweepReport::default();
        if config.background_re_encryption {
            for namespace in &config.namespaces {
                sweep.merge(self.sweeper.run(
                    namespace,
                    &version,
                    &kek,
                    config.sweep_batch_size,
                    auth,
                )?);
            }
        }

        let now = Utc::now();
        self.settings.set(SETTING_LAST_ROTATION, &now.to_rfc3339())?;
        self.state.record_rotation(now);

        // Retention is housekeeping: a failure here does not undo the rotation
        let pruned = self
            .versions
            .prune(config.max_key_versions)
            .unwrap_or_else(|err| {
                warn!(%err, "pruning after rotation failed");
                PruneReport::default()
            });

        Ok((version, sweep, pruned))
    }
}
