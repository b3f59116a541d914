// src/crypto/encrypt.rs
use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use crate::aliases::{Kek32, RandomIv16, SecureRandomExt};
use crate::error::{CoreError, Result};

use super::{mac, Envelope};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Encrypt plaintext → authenticated envelope under `kek`
pub fn encrypt(plaintext: &[u8], kek: &Kek32) -> Result<Envelope> {
    let iv = **RandomIv16::new();

    let ciphertext = Aes256CbcEnc::new_from_slices(&kek.expose_secret()[..], &iv)
        .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let unsigned = Envelope::new(iv, ciphertext, None);
    let tag = mac::sign(kek, &unsigned)?;
    Ok(unsigned.with_tag(tag))
}

/// Encrypt plaintext → text envelope, ready for a string-valued item store
pub fn encrypt_to_string(plaintext: &[u8], kek: &Kek32) -> Result<String> {
    Ok(encrypt(plaintext, kek)?.encode())
}
