// src/lib.rs
//! key-rotation-vault — versioned envelope encryption with key rotation
//!
//! Features:
//! - AES-256-CBC envelopes authenticated with HMAC-SHA256
//! - Versioned KEKs with safe pruning
//! - Hardware-tier fallback from biometry down to software protection
//! - Batched re-encryption sweeps with per-item failure reports
//! - Biometric enrollment watching and scheduled rotation
//! - SQLCipher-backed software store

pub mod access_control;
pub mod aliases;
pub mod biometric;
pub mod capability;
pub mod config;
pub mod consts;
pub mod crypto;
pub mod engine;
pub mod enums;
pub mod events;
pub mod key_ops;
pub mod key_versions;
pub mod metadata;
pub mod platform;
pub mod rotation;
pub mod state;

pub mod error;

// Re-export everything users need at the crate root
pub use access_control::{AccessControlResolver, ResolvedAccessControl};
pub use aliases::{Kek32, PlainText, SecretValue};
pub use biometric::EnrollmentChange;
pub use capability::Capabilities;
pub use config::{load as load_config, RotationConfig};
pub use engine::{ItemOptions, KeyRotationEngine, RotationStatus, TickOutcome};
pub use enums::{AccessPolicy, Backend, BiometryType, RotationEventKind, RotationTrigger, SecurityLevel};
pub use error::{CoreError, ItemError, PlatformError, Result as CoreResult};
pub use events::{RotationEvent, Subscription};
pub use key_versions::{KeyVersion, PruneReport};
pub use metadata::StorageItemMetadata;
pub use rotation::{RotationResult, SchedulerHandle, SweepReport};
