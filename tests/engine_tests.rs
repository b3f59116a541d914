// tests/engine_tests.rs
//! Item API and the smaller facade operations

mod support;

use key_rotation_vault::platform::memory::SimulatedDevice;
use key_rotation_vault::platform::AuthPrompt;
use key_rotation_vault::{
    AccessPolicy, CoreError, ItemOptions, PlatformError, RotationConfig, SecurityLevel,
};
use support::{manual_config, Harness};

#[test]
fn set_get_delete_roundtrip() {
    let h = Harness::software();
    let options = ItemOptions::new();

    assert!(h.engine.get_item("missing", &options).unwrap().is_none());

    let metadata = h.engine.set_item("greeting", "hello", &options).unwrap();
    assert_eq!(metadata.access_control_policy, AccessPolicy::None);
    assert_eq!(metadata.security_level, SecurityLevel::Software);

    let raw = h.store.item("greeting", &options.namespace).unwrap();
    assert!(!raw.encrypted_value.contains("hello"));
    assert_eq!(raw.encrypted_value.split(']').count(), 3);

    assert_eq!(h.engine.get_item("greeting", &options).unwrap().unwrap().expose_secret(), "hello");
    assert!(h.engine.delete_item("greeting", &options).unwrap());
    assert!(h.engine.get_item("greeting", &options).unwrap().is_none());
}

#[test]
fn first_write_creates_initial_key_version() {
    let h = Harness::software();
    assert!(h.engine.get_rotation_status().current_key_version.is_none());
    h.engine.set_item("a", "1", &ItemOptions::new()).unwrap();
    h.engine.set_item("b", "2", &ItemOptions::new()).unwrap();

    let status = h.engine.get_rotation_status();
    assert_eq!(status.available_key_versions.len(), 1);
    assert!(status.current_key_version.is_some());
    assert!(status.last_rotation_timestamp.is_none());
}

#[test]
fn item_metadata_records_downgrade() {
    let h = Harness::new(SimulatedDevice::software_only());
    h.device.set_device_credential(true);
    let options = ItemOptions::new().with_policy(AccessPolicy::HardwareBiometric);

    let metadata = h.engine.set_item("pin", "0000", &options).unwrap();
    assert_eq!(metadata.access_control_policy, AccessPolicy::HardwareBiometric);
    assert_eq!(metadata.security_level, SecurityLevel::DeviceCredential);
}

#[test]
fn prompt_failures_surface_as_user_facing_errors() {
    let config = RotationConfig {
        key_requires_biometry: true,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::full_hardware(), config);
    let options = ItemOptions::new().with_prompt(AuthPrompt::new("Unlock your vault"));
    h.engine.set_item("k", "v", &options).unwrap();

    h.device.fail_next_authentication(PlatformError::Canceled);
    let err = h.engine.get_item("k", &options).unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationCanceled));
    assert!(err.is_user_facing());

    // The next attempt prompts again and succeeds
    assert_eq!(h.engine.get_item("k", &options).unwrap().unwrap().expose_secret(), "v");
}

#[test]
fn cancel_authentication_only_affects_operations_in_flight() {
    let config = RotationConfig {
        key_requires_biometry: true,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::full_hardware(), config);
    h.engine.set_item("k", "v", &ItemOptions::new()).unwrap();

    h.engine.cancel_authentication();
    assert_eq!(
        h.engine.get_item("k", &ItemOptions::new()).unwrap().unwrap().expose_secret(),
        "v"
    );
}

#[test]
fn capabilities_and_sensor_probe() {
    let plain = Harness::software();
    assert!(!plain.engine.is_sensor_available().unwrap());
    assert!(!plain.engine.capabilities().unwrap().hardware_isolated);

    let phone = Harness::full_hardware();
    assert!(phone.engine.is_sensor_available().unwrap());
    phone.device.lock_out_biometry();
    assert!(!phone.engine.is_sensor_available().unwrap());
    assert!(phone.engine.capabilities().unwrap().biometry_locked_out);
}

#[test]
fn prune_and_delete_through_facade() {
    let config = RotationConfig {
        max_key_versions: 10,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::software_only(), config);
    let pinned = h.engine.set_item("keep", "me", &ItemOptions::new()).unwrap().key_version_id;

    // Items stay on the first version because the sweep is off
    h.engine
        .initialize_key_rotation(RotationConfig {
            max_key_versions: 10,
            background_re_encryption: false,
            ..manual_config()
        })
        .unwrap();
    let spare = h.engine.rotate_keys(None).unwrap().new_key_version.id;
    h.engine.rotate_keys(None).unwrap();

    assert!(matches!(
        h.engine.delete_key_version(&pinned),
        Err(CoreError::KeyVersionInUse(_))
    ));

    h.engine
        .initialize_key_rotation(RotationConfig {
            max_key_versions: 1,
            background_re_encryption: false,
            ..manual_config()
        })
        .unwrap();
    let report = h.engine.prune_key_versions().unwrap();
    assert_eq!(report.deleted, vec![spare]);
    assert_eq!(report.retained_in_use, vec![pinned.clone()]);
    assert_eq!(h.engine.get_item("keep", &ItemOptions::new()).unwrap().unwrap().expose_secret(), "me");
}
