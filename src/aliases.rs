// src/aliases.rs
//! Re-exports secure-gate's ergonomic secret types
//!
//! These are the canonical secret types used throughout key-rotation-vault.

pub use secure_gate::{dynamic_alias, fixed_alias, random_alias, SecureRandomExt};

// Fixed-size secrets
fixed_alias!(Kek32, 32); // 256-bit key-encryption key (AES-256-CBC)
fixed_alias!(MacKey32, 32); // HMAC-SHA256 key derived from a KEK

// Dynamic secrets
dynamic_alias!(PlainText, Vec<u8>);
dynamic_alias!(SecretValue, String); // decrypted item value handed back to callers

// Random secrets
random_alias!(RandomKek32, 32);
random_alias!(RandomIv16, 16); // CBC initialisation vector, fresh per envelope
