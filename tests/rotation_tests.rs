// tests/rotation_tests.rs
//! Rotation orchestrator through the engine facade

mod common;
mod support;

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;
use key_rotation_vault::platform::memory::SimulatedDevice;
use key_rotation_vault::{CoreError, ItemOptions, RotationConfig, RotationEventKind};
use support::{manual_config, wait_for, Harness};

#[test]
fn manual_rotation_on_empty_store() {
    common::setup();
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());

    let result = h.engine.rotate_keys(Some("test")).unwrap();
    assert!(result.success);
    assert_eq!(result.items_re_encrypted, 0);
    assert_eq!(result.reason, "test");
    assert!(result.errors.is_empty());

    let status = h.engine.get_rotation_status();
    assert_eq!(status.current_key_version.unwrap().id, result.new_key_version.id);
    assert!(!status.is_rotation_in_progress);
    assert!(status.last_rotation_timestamp.is_some());
}

#[test]
fn rotation_migrates_existing_items() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    let options = ItemOptions::new();

    let written = h.engine.set_item("api_token", "s3cr3t", &options).unwrap();
    let v1 = written.key_version_id.clone();

    let result = h.engine.rotate_keys(None).unwrap();
    let v2 = result.new_key_version.id.clone();
    assert_ne!(v1, v2);
    assert_eq!(result.items_re_encrypted, 1);

    let raw = h.store.item("api_token", &options.namespace).unwrap();
    assert_eq!(raw.metadata.key_version_id, v2);
    let value = h.engine.get_item("api_token", &options).unwrap().unwrap();
    assert_eq!(value.expose_secret(), "s3cr3t");
}

#[test]
fn rotation_without_background_sweep_leaves_items_readable() {
    let config = RotationConfig {
        background_re_encryption: false,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::software_only(), config);
    let options = ItemOptions::new();
    let v1 = h.engine.set_item("k", "v", &options).unwrap().key_version_id;

    let result = h.engine.rotate_keys(None).unwrap();
    assert_eq!(result.items_re_encrypted, 0);
    assert_eq!(h.store.item("k", &options.namespace).unwrap().metadata.key_version_id, v1);
    assert_eq!(h.engine.get_item("k", &options).unwrap().unwrap().expose_secret(), "v");

    // New writes go to the new version
    let written = h.engine.set_item("k2", "v2", &options).unwrap();
    assert_eq!(written.key_version_id, result.new_key_version.id);
}

#[test]
fn concurrent_rotation_is_rejected_immediately() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    let (started_tx, started_rx) = bounded::<()>(0);
    let (release_tx, release_rx) = bounded::<()>(0);

    // Hold the first rotation inside its `started` callback
    let gate = Arc::new(Mutex::new(Some((started_tx, release_rx))));
    let _subscription = h.engine.on_rotation_event(move |event| {
        if event.kind == RotationEventKind::Started {
            if let Some((started, release)) = gate.lock().unwrap().take() {
                started.send(()).unwrap();
                release.recv().unwrap();
            }
        }
    });

    let engine = h.engine.clone();
    let first = thread::spawn(move || engine.rotate_keys(Some("first")));

    started_rx.recv().unwrap();
    assert!(h.engine.get_rotation_status().is_rotation_in_progress);
    let second = h.engine.rotate_keys(Some("second"));
    release_tx.send(()).unwrap();

    assert!(matches!(second, Err(CoreError::RotationAlreadyInProgress)));
    assert!(first.join().unwrap().unwrap().success);
    assert!(!h.engine.get_rotation_status().is_rotation_in_progress);
    assert_eq!(h.engine.get_rotation_status().available_key_versions.len(), 1);
}

#[test]
fn racing_threads_never_both_rotate_at_once() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    let barrier = Arc::new(std::sync::Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = h.engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.rotate_keys(None)
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => successes += 1,
            Err(CoreError::RotationAlreadyInProgress) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(successes >= 1);
    assert!(!h.engine.get_rotation_status().is_rotation_in_progress);
}

#[test]
fn events_report_start_and_completion() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    h.engine.set_item("a", "1", &ItemOptions::new()).unwrap();
    h.engine.set_item("b", "2", &ItemOptions::new()).unwrap();
    let (_subscription, rx) = h.events();

    let result = h.engine.rotate_keys(Some("audit")).unwrap();

    let started = rx.try_recv().unwrap();
    assert_eq!(started.kind, RotationEventKind::Started);
    assert_eq!(started.reason, "audit");

    let completed = rx.try_recv().unwrap();
    assert_eq!(completed.kind, RotationEventKind::Completed);
    assert_eq!(completed.items_re_encrypted, Some(2));
    assert_eq!(completed.key_version_id.as_deref(), Some(result.new_key_version.id.as_str()));
    assert!(completed.duration_ms.is_some());
    assert!(rx.try_recv().is_err());
}

#[test]
fn unsubscribed_listener_gets_nothing() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    let (subscription, rx) = h.events();
    subscription.unsubscribe();

    h.engine.rotate_keys(None).unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn failed_rotation_clears_flag_and_emits_failed() {
    let config = RotationConfig {
        key_requires_biometry: true,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::full_hardware(), config);
    h.engine.rotate_keys(None).unwrap();

    h.device.lock_out_biometry();
    let (_subscription, rx) = h.events();

    let err = h.engine.rotate_keys(Some("during lockout")).unwrap_err();
    assert!(matches!(err, CoreError::BiometryLockout));

    let failed = wait_for(&rx, RotationEventKind::Failed);
    assert!(failed.reason.starts_with("during lockout"));
    assert!(!h.engine.get_rotation_status().is_rotation_in_progress);

    // Nothing weaker was created in the meantime
    assert_eq!(h.engine.get_rotation_status().available_key_versions.len(), 1);

    h.device.clear_lockout();
    assert!(h.engine.rotate_keys(None).unwrap().success);
}

#[test]
fn panicking_listener_does_not_leave_rotation_stuck() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    let _subscription = h.engine.on_rotation_event(|event| {
        if event.kind == RotationEventKind::Started {
            panic!("listener bug");
        }
    });

    let engine = h.engine.clone();
    assert!(thread::spawn(move || engine.rotate_keys(None)).join().is_err());
    assert!(!h.engine.get_rotation_status().is_rotation_in_progress);
}

#[test]
fn manual_rotation_can_be_disabled() {
    let config = RotationConfig {
        manual_rotation_enabled: false,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::software_only(), config);
    assert!(matches!(
        h.engine.rotate_keys(None),
        Err(CoreError::RotationDisabled(_))
    ));
    assert!(h.engine.get_rotation_status().available_key_versions.is_empty());
}

#[test]
fn rotation_prunes_to_retention_limit() {
    let config = RotationConfig {
        max_key_versions: 2,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::software_only(), config);

    for _ in 0..4 {
        h.engine.rotate_keys(None).unwrap();
    }
    let status = h.engine.get_rotation_status();
    assert_eq!(status.available_key_versions.len(), 2);
    assert_eq!(
        status.available_key_versions.last().map(|v| &v.id),
        status.current_key_version.as_ref().map(|v| &v.id)
    );
    assert_eq!(h.store.key_material_count(), 2);
}

#[test]
fn rotation_state_survives_restart() {
    let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
    h.engine.set_item("k", "v", &ItemOptions::new()).unwrap();
    let result = h.engine.rotate_keys(None).unwrap();
    let before = h.engine.get_rotation_status();

    let restarted = h.restart();
    let after = restarted.get_rotation_status();
    assert_eq!(after.current_key_version.unwrap().id, result.new_key_version.id);
    assert_eq!(after.available_key_versions, before.available_key_versions);
    assert!(after.last_rotation_timestamp.is_some());
    assert!(!after.is_rotation_in_progress);
    assert_eq!(restarted.config().rotation_interval_ms, 0);
    assert_eq!(
        restarted.get_item("k", &ItemOptions::new()).unwrap().unwrap().expose_secret(),
        "v"
    );
}

#[test]
fn items_outside_configured_namespaces_keep_their_key() {
    let config = RotationConfig {
        max_key_versions: 1,
        ..manual_config()
    };
    let h = Harness::with_config(SimulatedDevice::software_only(), config);
    let elsewhere = ItemOptions::new().in_namespace("auth_tokens");

    let v1 = h.engine.set_item("refresh", "r3fr3sh", &elsewhere).unwrap().key_version_id;
    let result = h.engine.rotate_keys(None).unwrap();
    assert_eq!(result.items_re_encrypted, 0);
    assert_eq!(result.pruned.retained_in_use, vec![v1.clone()]);
    assert!(result.pruned.deleted.is_empty());

    assert!(h.engine.prune_key_versions().unwrap().deleted.is_empty());
    assert!(matches!(
        h.engine.delete_key_version(&v1),
        Err(CoreError::KeyVersionInUse(_))
    ));
    assert_eq!(
        h.engine.get_item("refresh", &elsewhere).unwrap().unwrap().expose_secret(),
        "r3fr3sh"
    );
}

#[test]
fn first_write_racing_a_rotation_never_corrupts_a_key() {
    for _ in 0..25 {
        let h = Harness::with_config(SimulatedDevice::software_only(), manual_config());
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let engine = h.engine.clone();
        let gate = barrier.clone();
        let rotation = thread::spawn(move || {
            gate.wait();
            engine.rotate_keys(None)
        });

        barrier.wait();
        h.engine.set_item("k", "v", &ItemOptions::new()).unwrap();
        rotation.join().unwrap().unwrap();

        let status = h.engine.get_rotation_status();
        assert_eq!(h.store.key_material_count(), status.available_key_versions.len());
        assert_eq!(
            h.engine.get_item("k", &ItemOptions::new()).unwrap().unwrap().expose_secret(),
            "v"
        );
    }
}
