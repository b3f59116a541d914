// src/events.rs
//! Rotation event emission
//!
//! Events are delivered synchronously on the emitting thread. Subscribing
//! returns a [`Subscription`]; unsubscribing stops delivery to that callback
//! and has no effect on rotations already running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enums::RotationEventKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEvent {
    #[serde(rename = "type")]
    pub kind: RotationEventKind,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_re_encrypted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_version_id: Option<String>,
}

impl RotationEvent {
    pub fn new(kind: RotationEventKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            reason: reason.into(),
            items_re_encrypted: None,
            duration_ms: None,
            key_version_id: None,
        }
    }

    pub fn with_items(mut self, items: usize) -> Self {
        self.items_re_encrypted = Some(items);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_key_version(mut self, version_id: impl Into<String>) -> Self {
        self.key_version_id = Some(version_id.into());
        self
    }
}

type Listener = Arc<dyn Fn(&RotationEvent) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

#[derive(Default)]
pub struct EventBus {
    listeners: Arc<Listeners>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RotationEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(callback)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver to every current subscriber. The list is copied first so a
    /// callback may unsubscribe itself without deadlocking.
    pub fn emit(&self, event: &RotationEvent) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

fn lock(listeners: &Listeners) -> MutexGuard<'_, Vec<(u64, Listener)>> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`EventBus::subscribe`]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}
