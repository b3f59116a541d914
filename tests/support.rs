// tests/support.rs
//! Test utilities — engines wired to a scriptable device and in-memory stores

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use key_rotation_vault::platform::memory::{MemoryItemStore, MemorySettings, SimulatedDevice};
use key_rotation_vault::{
    KeyRotationEngine, RotationConfig, RotationEvent, RotationEventKind, Subscription,
};

#[allow(dead_code)]
pub struct Harness {
    pub device: Arc<SimulatedDevice>,
    pub store: Arc<MemoryItemStore>,
    pub settings: Arc<MemorySettings>,
    pub engine: KeyRotationEngine,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(device: SimulatedDevice) -> Self {
        let device = Arc::new(device);
        let store = Arc::new(MemoryItemStore::with_device(device.clone()));
        let settings = Arc::new(MemorySettings::new());
        let engine = KeyRotationEngine::new(device.clone(), store.clone(), settings.clone())
            .expect("engine");
        Self {
            device,
            store,
            settings,
            engine,
        }
    }

    pub fn software() -> Self {
        Self::new(SimulatedDevice::software_only())
    }

    pub fn full_hardware() -> Self {
        Self::new(SimulatedDevice::full_hardware())
    }

    /// Harness already initialized with `config`
    pub fn with_config(device: SimulatedDevice, config: RotationConfig) -> Self {
        let harness = Self::new(device);
        harness
            .engine
            .initialize_key_rotation(config)
            .expect("initialize");
        harness
    }

    /// A second engine over the same device and stores, as after a restart
    pub fn restart(&self) -> KeyRotationEngine {
        KeyRotationEngine::new(
            self.device.clone(),
            self.store.clone(),
            self.settings.clone(),
        )
        .expect("engine after restart")
    }

    pub fn events(&self) -> (Subscription, Receiver<RotationEvent>) {
        event_channel(&self.engine)
    }
}

/// Rotation only on demand
#[allow(dead_code)]
pub fn manual_config() -> RotationConfig {
    RotationConfig {
        rotation_interval_ms: 0,
        rotate_on_biometric_change: false,
        ..RotationConfig::default()
    }
}

#[allow(dead_code)]
pub fn event_channel(engine: &KeyRotationEngine) -> (Subscription, Receiver<RotationEvent>) {
    let (tx, rx) = unbounded();
    let subscription = engine.on_rotation_event(move |event| {
        let _ = tx.send(event.clone());
    });
    (subscription, rx)
}

/// Block until an event of `kind` arrives, skipping others
#[allow(dead_code)]
pub fn wait_for(rx: &Receiver<RotationEvent>, kind: RotationEventKind) -> RotationEvent {
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"));
        if event.kind == kind {
            return event;
        }
    }
}
