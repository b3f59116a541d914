// src/key_ops.rs
//! Key generation and representation utilities
//!
//! This module handles secure KEK generation, the short fingerprints used to
//! recognise a KEK without exposing it, and the ISO-8601 version ids.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};

use crate::aliases::{Kek32, RandomKek32, SecureRandomExt};
use crate::consts::FINGERPRINT_LEN;

/// Generate a new random 256-bit KEK
#[inline]
pub fn generate_kek() -> Kek32 {
    Kek32::new(**RandomKek32::new())
}

/// Hex of the first bytes of the BLAKE3 digest of the key material
pub fn fingerprint(kek: &Kek32) -> String {
    let digest = blake3::hash(kek.expose_secret());
    hex::encode(&digest.as_bytes()[..FINGERPRINT_LEN])
}

/// Version id for a KEK created at `now`
///
/// Ids are millisecond ISO-8601 UTC timestamps, so lexical order is
/// creation order. If `now` would not sort after `latest`, the id is bumped
/// one millisecond past it.
pub fn next_version_id(now: DateTime<Utc>, latest: Option<&str>) -> String {
    let mut candidate = now.trunc_subsecs(3);
    if let Some(latest) = latest.and_then(|id| DateTime::parse_from_rfc3339(id).ok()) {
        let latest = latest.with_timezone(&Utc);
        if candidate <= latest {
            candidate = latest + Duration::milliseconds(1);
        }
    }
    candidate.to_rfc3339_opts(SecondsFormat::Millis, true)
}
