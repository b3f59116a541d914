// src/crypto/decrypt.rs
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::aliases::{Kek32, PlainText};
use crate::error::{CoreError, Result};

use super::{mac, Envelope};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Decrypt an envelope → plaintext. A wrong key is always `DecryptionFailed`.
pub fn decrypt(envelope: &Envelope, kek: &Kek32) -> Result<PlainText> {
    if let Some(tag) = envelope.tag() {
        mac::verify(kek, envelope, tag)?;
    }

    let plaintext = Aes256CbcDec::new_from_slices(&kek.expose_secret()[..], envelope.iv())
        .map_err(|_| CoreError::DecryptionFailed)?
        .decrypt_padded_vec_mut::<Pkcs7>(envelope.ciphertext())
        .map_err(|_| CoreError::DecryptionFailed)?;

    Ok(PlainText::new(plaintext))
}

/// Decrypt a text envelope produced by [`super::encrypt_to_string`]
pub fn decrypt_str(text: &str, kek: &Kek32) -> Result<PlainText> {
    decrypt(&Envelope::decode(text)?, kek)
}
