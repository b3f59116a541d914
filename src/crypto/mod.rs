// src/crypto/mod.rs
//! Envelope cipher: pure cryptographic operations over caller-supplied KEKs
//!
//! AES-256-CBC with PKCS#7 padding and a fresh random IV per call,
//! authenticated with HMAC-SHA256 (encrypt-then-MAC). Callers always supply
//! the resolved KEK; nothing here caches keys.
mod decrypt;
mod encrypt;
mod envelope;
mod mac;

pub use decrypt::{decrypt, decrypt_str};
pub use encrypt::{encrypt, encrypt_to_string};
pub use envelope::Envelope;
