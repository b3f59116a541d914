// src/consts.rs
//! Shared constants for the cipher and the persisted settings

/// KEK length in bytes (AES-256)
pub const KEK_LEN: usize = 32;

/// AES block size, also the CBC initialization vector length
pub const IV_LEN: usize = 16;

/// HMAC-SHA256 tag length
pub const TAG_LEN: usize = 32;

/// Separator between the base64 parts of a text envelope
pub const ENVELOPE_DELIMITER: char = ']';

/// Label used to derive the MAC key from a KEK
pub const MAC_KEY_LABEL: &[u8] = b"key-rotation-vault/envelope-mac/v1";

/// Number of key-material bytes kept in a KEK fingerprint
pub const FINGERPRINT_LEN: usize = 8;

/// Namespace used when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "shared_preferences";

/// Items processed between progress reports during a sweep
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 50;

/// Settings keys. Everything the engine persists lives under `key_rotation.`
pub const SETTINGS_PREFIX: &str = "key_rotation.";
pub const SETTING_ENABLED: &str = "key_rotation.enabled";
pub const SETTING_INTERVAL_MS: &str = "key_rotation.rotation_interval_ms";
pub const SETTING_ROTATE_ON_BIOMETRIC: &str = "key_rotation.rotate_on_biometric_change";
pub const SETTING_ROTATE_ON_CREDENTIAL: &str = "key_rotation.rotate_on_credential_change";
pub const SETTING_MANUAL_ROTATION: &str = "key_rotation.manual_rotation_enabled";
pub const SETTING_MAX_KEY_VERSIONS: &str = "key_rotation.max_key_versions";
pub const SETTING_BACKGROUND_REENCRYPTION: &str = "key_rotation.background_re_encryption";
pub const SETTING_LAST_ROTATION: &str = "key_rotation.last_rotation_timestamp";
pub const SETTING_CURRENT_VERSION: &str = "key_rotation.current_key_version_id";
pub const SETTING_KEY_VERSIONS: &str = "key_rotation.key_versions";
pub const SETTING_LAST_ENROLLMENT: &str = "key_rotation.last_enrollment";

/// SQLCipher PBKDF2 iterations for the on-disk store
pub const DB_KDF_ITERATIONS: u32 = 256_000;
