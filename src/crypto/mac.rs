// src/crypto/mac.rs
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::aliases::{Kek32, MacKey32};
use crate::consts::{MAC_KEY_LABEL, TAG_LEN};
use crate::error::{CoreError, Result};

use super::Envelope;

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8]) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|e| CoreError::EncryptionFailed(e.to_string()))
}

/// Separate MAC key so the KEK never keys two primitives directly
fn mac_key(kek: &Kek32) -> Result<MacKey32> {
    let mut mac = hmac(&kek.expose_secret()[..])?;
    mac.update(MAC_KEY_LABEL);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(MacKey32::new(out))
}

pub(super) fn sign(kek: &Kek32, envelope: &Envelope) -> Result<[u8; TAG_LEN]> {
    let key = mac_key(kek)?;
    let mut mac = hmac(&key.expose_secret()[..])?;
    mac.update(&envelope.authenticated_bytes());
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

pub(super) fn verify(kek: &Kek32, envelope: &Envelope, tag: &[u8; TAG_LEN]) -> Result<()> {
    let key = mac_key(kek).map_err(|_| CoreError::DecryptionFailed)?;
    let mut mac = hmac(&key.expose_secret()[..]).map_err(|_| CoreError::DecryptionFailed)?;
    mac.update(&envelope.authenticated_bytes());
    mac.verify_slice(tag).map_err(|_| CoreError::DecryptionFailed)
}
