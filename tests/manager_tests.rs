use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use audioroute::substrate::{SimulatedDevice, SimulatedStore};
use audioroute::{ChangeEvent, DefaultDeviceKind, DeviceManager, EventObserver};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ChangeEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl EventObserver for Recorder {
    async fn on_change(&self, event: ChangeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Event delivery crosses the pump thread and the router workers; poll until
/// the expectation holds or the deadline passes.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

fn store_with_two_devices() -> (Arc<SimulatedStore>, u32, u32) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(SimulatedStore::new());
    let speakers = store.install(SimulatedDevice::new("uid:speakers", "Speakers"));
    let mic = store.install(
        SimulatedDevice::new("uid:mic", "Microphone").input_channels(1).output_channels(0),
    );
    (store, speakers, mic)
}

#[tokio::test]
async fn construction_populates_the_registry() {
    let (store, speakers, mic) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    assert_eq!(manager.all_devices().len(), 2);
    assert_eq!(manager.device_by_uid("uid:speakers").unwrap().handle(), speakers);
    assert_eq!(manager.device_by_uid("uid:mic").unwrap().handle(), mic);
    assert!(manager.device_by_uid("uid:absent").is_none());

    let inputs = manager.input_devices();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].uid(), "uid:mic");
    let outputs = manager.output_devices();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].uid(), "uid:speakers");

    manager.shutdown().await;
}

#[tokio::test]
async fn hardware_filters_evaluate_fresh() {
    let (store, speakers, _mic) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();
    let hardware = manager.hardware();

    assert_eq!(hardware.all_device_ids().unwrap().len(), 2);
    assert_eq!(hardware.output_device_ids().unwrap(), vec![speakers]);

    let added = store.install(SimulatedDevice::new("uid:hdmi", "HDMI Out"));
    // No reconciliation needed for the id filters; they re-enumerate.
    let ids = hardware.all_device_ids().unwrap();
    assert!(ids.contains(&added));
    assert_eq!(hardware.output_device_ids().unwrap().len(), 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn plugging_a_device_emits_one_added_event() {
    let (store, _, _) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn EventObserver> = recorder.clone();
    manager.subscribe(&observer);

    store.install(SimulatedDevice::new("uid:new", "Newcomer"));
    wait_until(|| recorder.count() >= 1).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ChangeEvent::DeviceListChanged { added, removed } => {
            assert_eq!(added.len(), 1);
            assert_eq!(added[0].uid(), "uid:new");
            assert!(removed.is_empty());
        }
        other => panic!("expected DeviceListChanged, got {other:?}"),
    }
    assert!(manager.device_by_uid("uid:new").is_some());

    manager.shutdown().await;
}

#[tokio::test]
async fn atomic_reconfiguration_yields_exactly_one_aggregated_event() {
    let (store, _, mic) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn EventObserver> = recorder.clone();
    manager.subscribe(&observer);

    // One hardware notification adds uid:agg and removes uid:mic.
    store.reconfigure(
        vec![SimulatedDevice::new("uid:agg", "Aggregate")],
        &[mic],
    );
    wait_until(|| recorder.count() >= 1).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1, "expected one aggregated event, got {events:?}");
    match &events[0] {
        ChangeEvent::DeviceListChanged { added, removed } => {
            assert_eq!(added.len(), 1);
            assert_eq!(added[0].uid(), "uid:agg");
            assert_eq!(removed.len(), 1);
            assert_eq!(removed[0].uid(), "uid:mic");
        }
        other => panic!("expected DeviceListChanged, got {other:?}"),
    }

    assert!(manager.device_by_uid("uid:mic").is_none());
    assert!(manager.device_by_uid("uid:agg").is_some());

    manager.shutdown().await;
}

#[tokio::test]
async fn removed_devices_stop_delivering_but_keep_their_name() {
    let (store, _, mic) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let device = manager.device_by_uid("uid:mic").unwrap();
    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn EventObserver> = recorder.clone();
    manager.subscribe(&observer);

    store.unplug(mic);
    wait_until(|| recorder.count() >= 1).await;

    // The retired facade still serves its discovery-time snapshot.
    assert_eq!(device.name(), "Microphone");
    assert!(!device.verify_identity());
    assert!(manager.device_by_handle(mic).is_none());

    manager.shutdown().await;
}

#[tokio::test]
async fn default_device_changes_resolve_through_the_registry() {
    let (store, speakers, mic) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn EventObserver> = recorder.clone();
    manager.subscribe(&observer);

    store.set_default(DefaultDeviceKind::Output.selector(), speakers);
    store.set_default(DefaultDeviceKind::Input.selector(), mic);
    wait_until(|| recorder.count() >= 2).await;

    let events = recorder.events();
    assert!(matches!(
        &events[0],
        ChangeEvent::DefaultOutputChanged { device } if device.uid() == "uid:speakers"
    ));
    assert!(matches!(
        &events[1],
        ChangeEvent::DefaultInputChanged { device } if device.uid() == "uid:mic"
    ));

    assert_eq!(manager.default_output_device().unwrap().uid(), "uid:speakers");
    assert_eq!(manager.default_input_device().unwrap().uid(), "uid:mic");
    assert!(manager.system_output_device().is_none());

    manager.shutdown().await;
}

#[tokio::test]
async fn device_promotion_round_trips_through_events() {
    let (store, _, _) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn EventObserver> = recorder.clone();
    manager.subscribe(&observer);

    let speakers = manager.device_by_uid("uid:speakers").unwrap();
    speakers.set_as_default(DefaultDeviceKind::SystemOutput).unwrap();
    wait_until(|| recorder.count() >= 1).await;

    assert!(matches!(
        &recorder.events()[0],
        ChangeEvent::DefaultSystemChanged { device } if device.uid() == "uid:speakers"
    ));
    assert_eq!(manager.system_output_device().unwrap().uid(), "uid:speakers");

    manager.shutdown().await;
}

#[tokio::test]
async fn dropped_observers_are_skipped_and_later_ones_still_notified() {
    let (store, _, _) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let first_obs: Arc<dyn EventObserver> = first.clone();
    let second_obs: Arc<dyn EventObserver> = second.clone();
    manager.subscribe(&first_obs);
    manager.subscribe(&second_obs);

    drop(first_obs);
    drop(first);

    store.install(SimulatedDevice::new("uid:late", "Latecomer"));
    wait_until(|| second.count() >= 1).await;
    assert!(matches!(
        second.events()[0],
        ChangeEvent::DeviceListChanged { .. }
    ));

    manager.shutdown().await;
}

#[tokio::test]
async fn unsubscribed_observers_are_never_invoked() {
    let (store, _, _) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();

    let muted = Arc::new(Recorder::default());
    let control = Arc::new(Recorder::default());
    let muted_obs: Arc<dyn EventObserver> = muted.clone();
    let control_obs: Arc<dyn EventObserver> = control.clone();
    let token = manager.subscribe(&muted_obs);
    manager.subscribe(&control_obs);
    manager.unsubscribe(token);

    store.install(SimulatedDevice::new("uid:x", "X"));
    wait_until(|| control.count() >= 1).await;
    assert_eq!(muted.count(), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_zero_native_listeners() {
    let (store, _, _) = store_with_two_devices();
    let manager = DeviceManager::new(store.clone()).unwrap();
    assert!(store.active_listener_count() > 0);

    manager.shutdown().await;
    assert_eq!(store.active_listener_count(), 0);
    assert!(manager.all_devices().is_empty());
}
