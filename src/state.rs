// src/state.rs
//! Process-wide rotation state
//!
//! One instance per engine, injected wherever it is needed. Every field sits
//! behind a single mutex. The in-progress flag is only ever set through
//! [`SharedRotationState::try_begin`], whose guard clears it on drop, so a
//! rotation that returns early, errors out or panics cannot leave it stuck.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub current_key_version_id: Option<String>,
    pub available_key_version_ids: BTreeSet<String>,
    pub is_rotation_in_progress: bool,
    pub last_rotation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct SharedRotationState {
    inner: Mutex<RotationState>,
}

impl SharedRotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted fields. The in-progress flag always starts cleared:
    /// it only guards rotations inside this process.
    pub fn restore(
        current: Option<String>,
        available: BTreeSet<String>,
        last_rotation: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            inner: Mutex::new(RotationState {
                current_key_version_id: current,
                available_key_version_ids: available,
                is_rotation_in_progress: false,
                last_rotation_timestamp: last_rotation,
            }),
        }
    }

    // State stays consistent across a panicking holder: every mutation
    // below is a single assignment.
    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RotationState {
        self.lock().clone()
    }

    /// Idle → Rotating. Exactly one concurrent caller wins.
    pub fn try_begin(&self) -> Result<RotationGuard<'_>> {
        let mut state = self.lock();
        if state.is_rotation_in_progress {
            return Err(CoreError::RotationAlreadyInProgress);
        }
        state.is_rotation_in_progress = true;
        Ok(RotationGuard { state: self })
    }

    pub fn is_rotation_in_progress(&self) -> bool {
        self.lock().is_rotation_in_progress
    }

    pub fn current_key_version_id(&self) -> Option<String> {
        self.lock().current_key_version_id.clone()
    }

    pub fn set_current(&self, version_id: &str) {
        self.lock().current_key_version_id = Some(version_id.to_owned());
    }

    pub fn add_available(&self, version_id: &str) {
        self.lock()
            .available_key_version_ids
            .insert(version_id.to_owned());
    }

    pub fn remove_available(&self, version_id: &str) {
        self.lock().available_key_version_ids.remove(version_id);
    }

    pub fn record_rotation(&self, at: DateTime<Utc>) {
        self.lock().last_rotation_timestamp = Some(at);
    }

    pub fn last_rotation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().last_rotation_timestamp
    }
}

/// Proof that the caller owns the running rotation
#[must_use = "dropping the guard immediately ends the rotation"]
pub struct RotationGuard<'a> {
    state: &'a SharedRotationState,
}

impl Drop for RotationGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().is_rotation_in_progress = false;
    }
}
