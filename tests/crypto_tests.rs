// tests/crypto_tests.rs
use key_rotation_vault::crypto::*;
use key_rotation_vault::error::CoreError;
use key_rotation_vault::key_ops::{fingerprint, generate_kek, next_version_id};

use chrono::{TimeZone, Utc};

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let kek = generate_kek();
    let text = encrypt_to_string(b"Attack at dawn!", &kek).unwrap();
    let decrypted = decrypt_str(&text, &kek).unwrap();
    assert_eq!(decrypted.expose_secret().as_slice(), b"Attack at dawn!");
}

#[test]
fn test_empty_and_block_aligned_plaintexts() {
    let kek = generate_kek();
    for plaintext in [&b""[..], &[7u8; 16][..], &[9u8; 33][..]] {
        let envelope = encrypt(plaintext, &kek).unwrap();
        // PKCS#7 always adds at least one byte of padding
        assert!(envelope.ciphertext().len() > plaintext.len());
        assert_eq!(envelope.ciphertext().len() % 16, 0);
        assert_eq!(decrypt(&envelope, &kek).unwrap().expose_secret().as_slice(), plaintext);
    }
}

#[test]
fn test_fresh_iv_per_call() {
    let kek = generate_kek();
    let a = encrypt(b"same input", &kek).unwrap();
    let b = encrypt(b"same input", &kek).unwrap();
    assert_ne!(a.iv(), b.iv());
    assert_ne!(a.ciphertext(), b.ciphertext());
}

#[test]
fn test_wrong_key_is_decryption_failed() {
    let kek = generate_kek();
    let other = generate_kek();
    let text = encrypt_to_string(b"secret", &kek).unwrap();
    assert!(matches!(decrypt_str(&text, &other), Err(CoreError::DecryptionFailed)));
}

#[test]
fn test_tampered_ciphertext_is_rejected() {
    let kek = generate_kek();
    let envelope = encrypt(b"do not touch", &kek).unwrap();
    let text = envelope.encode();
    let parts: Vec<&str> = text.split(']').collect();
    assert_eq!(parts.len(), 3);

    // Swap in the ciphertext of a different message under the same key
    let other = encrypt(b"something else", &kek).unwrap().encode();
    let other_ct = other.split(']').nth(1).unwrap();
    let forged = format!("{}]{}]{}", parts[0], other_ct, parts[2]);

    assert!(matches!(decrypt_str(&forged, &kek), Err(CoreError::DecryptionFailed)));
}

#[test]
fn test_legacy_two_part_envelope_still_decrypts() {
    let kek = generate_kek();
    let text = encrypt_to_string(b"written by an old version", &kek).unwrap();
    let legacy = text.rsplit_once(']').unwrap().0.to_owned();

    let envelope = Envelope::decode(&legacy).unwrap();
    assert!(envelope.is_legacy());
    assert_eq!(
        decrypt(&envelope, &kek).unwrap().expose_secret().as_slice(),
        b"written by an old version"
    );
}

#[test]
fn test_wrapped_base64_is_accepted() {
    let kek = generate_kek();
    let text = encrypt_to_string(&[42u8; 200], &kek).unwrap();
    let wrapped: String = text
        .chars()
        .enumerate()
        .flat_map(|(i, c)| (i > 0 && i % 76 == 0).then_some('\n').into_iter().chain([c]))
        .collect();
    assert_eq!(decrypt_str(&wrapped, &kek).unwrap().expose_secret().len(), 200);
}

#[test]
fn test_malformed_envelopes() {
    let kek = generate_kek();
    for bad in ["", "no-delimiter", "a]b]c]d", "!!!]???", "AAAA]AAAAAAAAAAAAAAAAAAAAAA=="] {
        assert!(
            matches!(decrypt_str(bad, &kek), Err(CoreError::DecryptionFailed)),
            "accepted {bad:?}"
        );
    }
}

#[test]
fn test_fingerprint_identifies_key() {
    let kek = generate_kek();
    let other = generate_kek();
    assert_eq!(fingerprint(&kek), fingerprint(&kek));
    assert_ne!(fingerprint(&kek), fingerprint(&other));
    assert_eq!(fingerprint(&kek).len(), 16);
}

#[test]
fn test_version_ids_sort_by_creation() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let first = next_version_id(now, None);
    assert_eq!(first, "2025-03-01T12:00:00.000Z");

    // Same instant again: bumped past the latest id
    let second = next_version_id(now, Some(&first));
    assert_eq!(second, "2025-03-01T12:00:00.001Z");
    assert!(second > first);

    // Clock went backwards
    let earlier = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    assert!(next_version_id(earlier, Some(&second)) > second);
}
