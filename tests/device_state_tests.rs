use std::sync::Arc;

use audioroute::device::AudioDevice;
use audioroute::substrate::{SimulatedDevice, SimulatedStore};
use audioroute::{ControlError, DefaultDeviceKind, Direction};

fn interface() -> (Arc<SimulatedStore>, Arc<AudioDevice>) {
    let store = Arc::new(SimulatedStore::new());
    let handle = store.install(
        SimulatedDevice::new("uid:usb", "USB Interface")
            .input_channels(2)
            .output_channels(2)
            .sample_rates(&[44_100.0, 48_000.0, 96_000.0])
            .clock_sources(&["Internal Clock", "S/PDIF"])
            .transport(u32::from_be_bytes(*b"usb "))
            .latency_frames(32, 64)
            .safety_offset_frames(16, 16),
    );
    let device = AudioDevice::attach(store.clone(), handle).unwrap();
    (store, device)
}

#[tokio::test]
async fn general_information_reads() {
    let (_store, device) = interface();

    assert_eq!(device.name(), "USB Interface");
    assert_eq!(device.uid(), "uid:usb");
    assert_eq!(device.manufacturer().unwrap(), "Simulated Audio Co.");
    assert_eq!(device.transport_type().unwrap(), audioroute::TransportType::Usb);
    assert!(!device.is_hidden());
    assert!(device.is_alive());
    assert!(!device.is_running());
    assert_eq!(device.channels(Direction::Recording), 2);
    assert_eq!(device.channels(Direction::Playback), 2);
    assert!(!device.is_input_only());
    assert!(!device.is_output_only());
    assert_eq!(device.latency(Direction::Playback).unwrap(), 64);
    assert_eq!(device.safety_offset(Direction::Recording).unwrap(), 16);
    assert_eq!(
        device.preferred_stereo_channels(Direction::Playback).unwrap(),
        (1, 2)
    );
    assert_eq!(device.related_device_ids().unwrap(), vec![device.handle()]);
}

#[tokio::test]
async fn channel_names_come_from_the_driver() {
    let store = Arc::new(SimulatedStore::new());
    let handle = store.install(
        SimulatedDevice::new("uid:named", "Named Channels").channel_names(&["Left", "Right"]),
    );
    let device = AudioDevice::attach(store.clone(), handle).unwrap();

    assert_eq!(device.channel_name(1, Direction::Playback).unwrap(), "Left");
    assert_eq!(device.channel_name(2, Direction::Playback).unwrap(), "Right");
    assert!(device.channel_name(3, Direction::Playback).is_err());
}

#[tokio::test]
async fn hidden_devices_are_reachable_only_by_uid() {
    let store = Arc::new(SimulatedStore::new());
    store.install(SimulatedDevice::new("uid:ghost", "Ghost").hidden());

    let device = AudioDevice::attach_by_uid(store.clone(), "uid:ghost").unwrap();
    assert!(device.is_hidden());
    assert!(!store.device_handles().contains(&device.handle()));

    device.shutdown().await;
}

#[tokio::test]
async fn preferred_direction_follows_capabilities() {
    let store = Arc::new(SimulatedStore::new());
    let mic = store.install(
        SimulatedDevice::new("uid:mic", "Mono Mic").input_channels(1).output_channels(0),
    );
    let speakers = store.install(SimulatedDevice::new("uid:spk", "Speakers"));

    let mic = AudioDevice::attach(store.clone(), mic).unwrap();
    let speakers = AudioDevice::attach(store.clone(), speakers).unwrap();

    assert_eq!(mic.preferred_direction(), Direction::Recording);
    assert!(mic.is_input_only());
    assert_eq!(speakers.preferred_direction(), Direction::Playback);
    assert!(speakers.is_output_only());
}

#[tokio::test]
async fn nominal_sample_rate_round_trips() {
    let (_store, device) = interface();

    assert_eq!(device.nominal_sample_rate().unwrap(), 44_100.0);
    device.set_nominal_sample_rate(96_000.0).unwrap();
    assert_eq!(device.nominal_sample_rate().unwrap(), 96_000.0);
    assert_eq!(device.actual_sample_rate().unwrap(), 96_000.0);
}

#[tokio::test]
async fn unsupported_sample_rate_fails_and_mutates_nothing() {
    let (_store, device) = interface();

    let before = device.nominal_sample_rate().unwrap();
    let err = device.set_nominal_sample_rate(22_050.0).unwrap_err();
    assert!(matches!(err, ControlError::ConstraintViolation(_)));
    assert_eq!(device.nominal_sample_rate().unwrap(), before);
}

#[tokio::test]
async fn range_reported_rates_expand_to_discrete_values() {
    let store = Arc::new(SimulatedStore::new());
    let handle = store.install(
        SimulatedDevice::new("uid:headset", "Range Headset")
            .sample_rates(&[])
            .sample_rate_range(8_000.0, 48_000.0),
    );
    let device = AudioDevice::attach(store.clone(), handle).unwrap();

    assert_eq!(
        device.nominal_sample_rates().unwrap(),
        vec![8_000.0, 11_025.0, 12_000.0, 16_000.0, 22_050.0, 24_000.0, 32_000.0, 44_100.0, 48_000.0]
    );
}

#[tokio::test]
async fn clock_source_selection_by_name() {
    let (_store, device) = interface();

    assert_eq!(
        device.clock_source(0, Direction::Playback).unwrap(),
        "Internal Clock"
    );
    assert_eq!(
        device.clock_sources(0, Direction::Playback).unwrap(),
        vec!["Internal Clock".to_string(), "S/PDIF".to_string()]
    );

    device.set_clock_source("S/PDIF", 0, Direction::Playback).unwrap();
    assert_eq!(device.clock_source(0, Direction::Playback).unwrap(), "S/PDIF");
}

#[tokio::test]
async fn unknown_clock_source_name_is_rejected() {
    let (_store, device) = interface();

    let before = device.clock_source(0, Direction::Playback).unwrap();
    let err = device
        .set_clock_source("Word Clock", 0, Direction::Playback)
        .unwrap_err();
    assert!(matches!(err, ControlError::ConstraintViolation(_)));
    assert_eq!(device.clock_source(0, Direction::Playback).unwrap(), before);
}

#[tokio::test]
async fn hog_mode_is_exclusive_until_released() {
    let (_store, device) = interface();
    let our_pid = std::process::id() as i32;
    let other_pid = our_pid + 1;

    assert_eq!(device.hog_mode_pid().unwrap(), None);
    device.set_hog_mode_to_current_process().unwrap();
    assert_eq!(device.hog_mode_pid().unwrap(), Some(our_pid));

    // A second claimant is refused while we hold the device, without a write.
    let err = device.set_hog_mode_pid(other_pid).unwrap_err();
    assert_eq!(err, ControlError::PermissionDenied { holder: our_pid });
    assert_eq!(device.hog_mode_pid().unwrap(), Some(our_pid));

    // Claiming again for ourselves is a no-op success.
    device.set_hog_mode_to_current_process().unwrap();

    device.unset_hog_mode().unwrap();
    assert_eq!(device.hog_mode_pid().unwrap(), None);

    // After release the other claimant succeeds, and we are refused in turn.
    device.set_hog_mode_pid(other_pid).unwrap();
    assert_eq!(device.hog_mode_pid().unwrap(), Some(other_pid));
    let err = device.set_hog_mode_to_current_process().unwrap_err();
    assert_eq!(err, ControlError::PermissionDenied { holder: other_pid });

    // Releasing on behalf of a process we do not supervise fails too.
    let err = device.unset_hog_mode().unwrap_err();
    assert_eq!(err, ControlError::PermissionDenied { holder: other_pid });
    device.unset_hog_mode_for(other_pid).unwrap();
    assert_eq!(device.hog_mode_pid().unwrap(), None);
}

#[tokio::test]
async fn cached_name_survives_unreachable_device() {
    let (store, device) = interface();

    store.set_unreachable(device.handle(), true);
    assert_eq!(device.name(), "USB Interface");
    assert!(device.manufacturer().is_err());

    store.set_unreachable(device.handle(), false);
    store.rename(device.handle(), "USB Interface Mk II");
    assert_eq!(device.name(), "USB Interface Mk II");
}

#[tokio::test]
async fn cached_capabilities_survive_unreachable_device() {
    let (store, device) = interface();

    assert_eq!(device.channels(Direction::Playback), 2);
    store.set_unreachable(device.handle(), true);
    assert_eq!(device.channels(Direction::Playback), 2);
    assert!(device.has_output());
}

#[tokio::test]
async fn identity_fails_closed_when_the_handle_is_recycled() {
    let store = Arc::new(SimulatedStore::new());
    let handle = store.install(SimulatedDevice::new("uid:first", "First"));
    let device = AudioDevice::attach(store.clone(), handle).unwrap();

    assert!(device.verify_identity());

    store.unplug(handle);
    assert!(!device.verify_identity());

    // A different device reusing the handle must not be mistaken for ours.
    store.install_at(handle, SimulatedDevice::new("uid:second", "Second"));
    assert!(!device.verify_identity());

    device.shutdown().await;
}

#[tokio::test]
async fn attach_by_uid_resolves_and_rejects() {
    let store = Arc::new(SimulatedStore::new());
    let handle = store.install(SimulatedDevice::new("uid:by-uid", "By UID"));

    let device = AudioDevice::attach_by_uid(store.clone(), "uid:by-uid").unwrap();
    assert_eq!(device.handle(), handle);

    let err = AudioDevice::attach_by_uid(store.clone(), "uid:absent").unwrap_err();
    assert!(matches!(err, ControlError::InvalidObjectReference(_)));

    device.shutdown().await;
}

#[tokio::test]
async fn set_as_default_promotes_the_device() {
    let (store, device) = interface();

    device.set_as_default(DefaultDeviceKind::Output).unwrap();
    device.set_as_default(DefaultDeviceKind::SystemOutput).unwrap();

    let bridge = audioroute::PropertyBridge::new(store);
    let assigned = bridge
        .get_u32(
            audioroute::substrate::SYSTEM_OBJECT,
            audioroute::substrate::PropertyAddress::global(
                DefaultDeviceKind::Output.selector(),
            ),
        )
        .unwrap();
    assert_eq!(assigned, device.handle());
}

#[tokio::test]
async fn description_snapshot_serializes() {
    let (_store, device) = interface();

    let description = device.describe();
    assert_eq!(description.uid, "uid:usb");
    assert_eq!(description.input_channels, 2);
    assert_eq!(description.nominal_sample_rate, Some(44_100.0));

    let json = serde_json::to_string(&description).unwrap();
    let parsed: audioroute::DeviceDescription = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, description);
}
