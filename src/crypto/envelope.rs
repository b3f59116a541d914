// src/crypto/envelope.rs
//! Self-contained ciphertext container and its text encoding
//!
//! Text form: `base64(iv) ] base64(ciphertext) ] base64(tag)`.
//! Values written before tags existed use the two-part form
//! `base64(iv) ] base64(ciphertext)` and are still readable.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::consts::{ENVELOPE_DELIMITER, IV_LEN, TAG_LEN};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
    tag: Option<[u8; TAG_LEN]>,
}

impl Envelope {
    pub(crate) fn new(iv: [u8; IV_LEN], ciphertext: Vec<u8>, tag: Option<[u8; TAG_LEN]>) -> Self {
        Self {
            iv,
            ciphertext,
            tag,
        }
    }

    pub(crate) fn with_tag(mut self, tag: [u8; TAG_LEN]) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn tag(&self) -> Option<&[u8; TAG_LEN]> {
        self.tag.as_ref()
    }

    /// Two-part envelope without a MAC; integrity rests on padding checks only
    pub fn is_legacy(&self) -> bool {
        self.tag.is_none()
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(&STANDARD.encode(self.iv));
        out.push(ENVELOPE_DELIMITER);
        out.push_str(&STANDARD.encode(&self.ciphertext));
        if let Some(tag) = &self.tag {
            out.push(ENVELOPE_DELIMITER);
            out.push_str(&STANDARD.encode(tag));
        }
        out
    }

    /// Parse a text envelope. Any malformation is a `DecryptionFailed`.
    pub fn decode(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(ENVELOPE_DELIMITER).collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(CoreError::DecryptionFailed);
        }

        let iv: [u8; IV_LEN] = decode_part(parts[0])?
            .try_into()
            .map_err(|_| CoreError::DecryptionFailed)?;

        let ciphertext = decode_part(parts[1])?;
        if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
            return Err(CoreError::DecryptionFailed);
        }

        let tag = match parts.get(2) {
            Some(part) => Some(
                decode_part(part)?
                    .try_into()
                    .map_err(|_| CoreError::DecryptionFailed)?,
            ),
            None => None,
        };

        Ok(Self::new(iv, ciphertext, tag))
    }

    /// Bytes covered by the MAC
    pub(crate) fn authenticated_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        data.extend_from_slice(&self.iv);
        data.extend_from_slice(&self.ciphertext);
        data
    }
}

// Older writers wrapped base64 output every 76 chars
fn decode_part(part: &str) -> Result<Vec<u8>> {
    let compact: String = part.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|_| CoreError::DecryptionFailed)
}
