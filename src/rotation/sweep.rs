// src/rotation/sweep.rs
//! Re-encryption sweep
//!
//! Moves every item of a namespace onto the target key version. Items
//! already on the target are skipped, so running a sweep twice is harmless.
//! A failing item is recorded and the sweep moves on.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access_control::AccessControlResolver;
use crate::aliases::Kek32;
use crate::crypto::{decrypt_str, encrypt_to_string};
use crate::error::{CoreError, ItemError, Result};
use crate::key_versions::{KeyVersion, KeyVersionManager};
use crate::metadata::StorageItemMetadata;
use crate::platform::{AuthContext, RawItem, SecureItemStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub items_re_encrypted: usize,
    pub errors: Vec<ItemError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn recorded item failures into [`CoreError::ReEncryptionPartialFailure`]
    pub fn into_result(self) -> Result<usize> {
        if self.errors.is_empty() {
            Ok(self.items_re_encrypted)
        } else {
            Err(CoreError::ReEncryptionPartialFailure(self.errors))
        }
    }

    pub fn merge(&mut self, other: SweepReport) {
        self.items_re_encrypted += other.items_re_encrypted;
        self.errors.extend(other.errors);
    }
}

/// Old KEKs already fetched during one sweep. A failed retrieval is kept
/// too, so a canceled prompt is not shown again for every item.
type KekCache = HashMap<String, std::result::Result<Kek32, String>>;

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn SecureItemStore>,
    versions: Arc<KeyVersionManager>,
    resolver: AccessControlResolver,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn SecureItemStore>,
        versions: Arc<KeyVersionManager>,
        resolver: AccessControlResolver,
    ) -> Self {
        Self {
            store,
            versions,
            resolver,
        }
    }

    /// Re-encrypt every item of `namespace` that is not on `target`
    pub fn run(
        &self,
        namespace: &str,
        target: &KeyVersion,
        target_kek: &Kek32,
        batch_size: usize,
        auth: &AuthContext,
    ) -> Result<SweepReport> {
        let items = self.store.get_all_raw(namespace)?;
        let pending: Vec<&RawItem> = items
            .iter()
            .filter(|item| item.metadata.key_version_id != target.id)
            .collect();

        let mut report = SweepReport::default();
        if pending.is_empty() {
            debug!(namespace, "nothing to re-encrypt");
            return Ok(report);
        }

        let batch_size = batch_size.max(1);
        let batches = pending.len().div_ceil(batch_size);
        let mut cache = KekCache::new();

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            for item in batch {
                match self.migrate(item, target, target_kek, &mut cache, auth) {
                    Ok(()) => report.items_re_encrypted += 1,
                    Err(error) => {
                        warn!(namespace, key = %item.key, %error, "item left on old key version");
                        report.errors.push(ItemError {
                            key: item.key.clone(),
                            error,
                        });
                    }
                }
            }
            debug!(
                namespace,
                batch = index + 1,
                batches,
                migrated = report.items_re_encrypted,
                "sweep progress"
            );
        }

        info!(
            namespace,
            version = %target.id,
            migrated = report.items_re_encrypted,
            failed = report.errors.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Errors come back as display strings: they end up in [`ItemError`]
    fn migrate(
        &self,
        item: &RawItem,
        target: &KeyVersion,
        target_kek: &Kek32,
        cache: &mut KekCache,
        auth: &AuthContext,
    ) -> std::result::Result<(), String> {
        let old_id = &item.metadata.key_version_id;
        if !self.versions.contains(old_id) {
            return Err(CoreError::UnresolvableKeyVersion {
                key: item.key.clone(),
                version: old_id.clone(),
            }
            .to_string());
        }

        let old_kek = cache
            .entry(old_id.clone())
            .or_insert_with(|| {
                self.versions
                    .retrieve(old_id, auth)
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(String::clone)?;

        let plaintext = decrypt_str(&item.encrypted_value, old_kek).map_err(|e| e.to_string())?;
        // Capabilities may have changed since the item was written
        let resolved = self
            .resolver
            .resolve(item.metadata.access_control_policy)
            .map_err(|e| e.to_string())?;
        let encrypted =
            encrypt_to_string(plaintext.expose_secret(), target_kek).map_err(|e| e.to_string())?;
        let metadata = StorageItemMetadata::new(&resolved, self.store.backend(), &target.id);

        self.store
            .update(&item.key, &item.namespace, &encrypted, &metadata)
            .map_err(|e| CoreError::from(e).to_string())
    }
}
