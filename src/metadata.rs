// src/metadata.rs
//! Per-item metadata persisted next to every encrypted value

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access_control::ResolvedAccessControl;
use crate::enums::{AccessPolicy, Backend, SecurityLevel};

/// Owned by the item's writer; only re-encryption rewrites it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageItemMetadata {
    pub security_level: SecurityLevel,
    pub backend: Backend,
    pub access_control_policy: AccessPolicy,
    pub timestamp: DateTime<Utc>,
    /// Alias of the KEK that encrypted the value
    pub key_version_id: String,
}

impl StorageItemMetadata {
    pub fn new(
        resolved: &ResolvedAccessControl,
        backend: Backend,
        key_version_id: impl Into<String>,
    ) -> Self {
        Self {
            security_level: resolved.achieved_security_level,
            backend,
            access_control_policy: resolved.requested_policy,
            timestamp: Utc::now(),
            key_version_id: key_version_id.into(),
        }
    }
}
