//! Process-wide device registry and event fan-out.
//!
//! One `DeviceManager` per process is the intended shape: construct it
//! explicitly, hold the `Arc`, and call `shutdown` when done. The registry
//! maps persistent UIDs to device facades; every other component resolves
//! devices through it and holds non-owning references.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::bridge::PropertyBridge;
use crate::device::AudioDevice;
use crate::error::Result;
use crate::events::{
    ChangeEvent, DefaultDeviceKind, Direction, EventObserver, ObserverHub, ObserverToken,
};
use crate::hardware::AudioHardware;
use crate::router::RawEventHandler;
use crate::substrate::{selectors, ObjectId, PropertyAddress, PropertyStore, RawPropertyEvent};

pub struct DeviceManager {
    store: Arc<dyn PropertyStore>,
    bridge: PropertyBridge,
    hardware: Arc<AudioHardware>,
    /// Persistent UID → device. Exclusively owned here; mutation happens in
    /// one serialized critical section so concurrent list notifications
    /// cannot double-insert or double-remove a UID.
    registry: Mutex<HashMap<String, Arc<AudioDevice>>>,
    hub: ObserverHub,
    self_weak: Weak<DeviceManager>,
    runtime: Handle,
}

impl DeviceManager {
    /// Builds the registry by full enumeration and installs the hardware
    /// subscription. Must be called within a tokio runtime; property reads
    /// may block on driver IPC.
    pub fn new(store: Arc<dyn PropertyStore>) -> Result<Arc<Self>> {
        let runtime = Handle::current();
        let manager = Arc::new_cyclic(|weak: &Weak<DeviceManager>| {
            let handler = Arc::new(HardwareEventHandler {
                manager: weak.clone(),
            });
            let hardware = AudioHardware::with_handler(store.clone(), handler);
            DeviceManager {
                bridge: PropertyBridge::new(store.clone()),
                store,
                hardware,
                registry: Mutex::new(HashMap::new()),
                hub: ObserverHub::new(),
                self_weak: weak.clone(),
                runtime,
            }
        });

        for handle in manager.hardware.all_device_ids()? {
            manager.adopt(handle);
        }
        Ok(manager)
    }

    /// The hardware facade owned by this manager.
    pub fn hardware(&self) -> &Arc<AudioHardware> {
        &self.hardware
    }

    /// Every device currently reported by the hardware, resolved through the
    /// registry. Presence is evaluated fresh; only the instances are cached.
    pub fn all_devices(&self) -> Vec<Arc<AudioDevice>> {
        let live = self.hardware.all_device_ids().unwrap_or_default();
        let registry = self.lock_registry();
        live.into_iter()
            .filter_map(|handle| {
                registry
                    .values()
                    .find(|device| device.handle() == handle)
                    .cloned()
            })
            .collect()
    }

    pub fn input_devices(&self) -> Vec<Arc<AudioDevice>> {
        self.all_devices()
            .into_iter()
            .filter(|d| d.channels(Direction::Recording) > 0)
            .collect()
    }

    pub fn output_devices(&self) -> Vec<Arc<AudioDevice>> {
        self.all_devices()
            .into_iter()
            .filter(|d| d.channels(Direction::Playback) > 0)
            .collect()
    }

    /// Resolves a device by its persistent UID.
    pub fn device_by_uid(&self, uid: &str) -> Option<Arc<AudioDevice>> {
        self.lock_registry().get(uid).cloned()
    }

    /// Resolves a device by session handle, failing closed: a handle whose
    /// live UID no longer matches the cached identity (removed device,
    /// recycled handle) resolves to nothing rather than the wrong device.
    pub fn device_by_handle(&self, handle: ObjectId) -> Option<Arc<AudioDevice>> {
        let candidate = {
            let registry = self.lock_registry();
            registry
                .values()
                .find(|device| device.handle() == handle)
                .cloned()
        };
        candidate.filter(|device| device.verify_identity())
    }

    pub fn default_input_device(&self) -> Option<Arc<AudioDevice>> {
        self.default_device(DefaultDeviceKind::Input)
    }

    pub fn default_output_device(&self) -> Option<Arc<AudioDevice>> {
        self.default_device(DefaultDeviceKind::Output)
    }

    pub fn system_output_device(&self) -> Option<Arc<AudioDevice>> {
        self.default_device(DefaultDeviceKind::SystemOutput)
    }

    fn default_device(&self, kind: DefaultDeviceKind) -> Option<Arc<AudioDevice>> {
        let handle = self.hardware.default_device_id(kind).ok().flatten()?;
        self.device_by_handle(handle)
    }

    /// Registers an observer for all events the manager forwards: per-device
    /// changes, list diffs, and default-device changes. Observers are held
    /// weakly and notified in registration order.
    pub fn subscribe(&self, observer: &Arc<dyn EventObserver>) -> ObserverToken {
        self.hub.subscribe(Arc::downgrade(observer))
    }

    pub fn unsubscribe(&self, token: ObserverToken) {
        self.hub.unsubscribe(token);
    }

    /// Tears down every notification path: the hardware subscription and
    /// each device's listeners. Once this returns no further event is
    /// delivered, and the registry is empty.
    pub async fn shutdown(&self) {
        self.hardware.shutdown().await;
        let devices: Vec<Arc<AudioDevice>> = self.lock_registry().drain().map(|(_, d)| d).collect();
        for device in devices {
            device.shutdown().await;
        }
    }

    /// Attaches and registers the device at `handle`. Devices that fail to
    /// attach (no UID, already gone) are skipped.
    fn adopt(&self, handle: ObjectId) -> Option<Arc<AudioDevice>> {
        match AudioDevice::attach(self.store.clone(), handle) {
            Ok(device) => {
                device.hub().subscribe(self.self_weak.clone());
                self.lock_registry()
                    .insert(device.uid().to_string(), device.clone());
                Some(device)
            }
            Err(err) => {
                warn!(handle, %err, "skipping device that failed to attach");
                None
            }
        }
    }

    /// Reconciles the registry against the live device list and emits exactly
    /// one aggregated event carrying both the added and the removed set.
    pub(crate) async fn reconcile_device_list(self: Arc<Self>) {
        let manager = self.clone();
        let diff = tokio::task::spawn_blocking(move || {
            // Re-enter the runtime so attached devices can spawn their
            // notification workers from this blocking thread.
            let _guard = manager.runtime.enter();
            manager.apply_device_list_diff()
        })
        .await
        .unwrap_or_default();
        let (added, removed) = diff;

        // Retired devices must deliver nothing after removal.
        for device in &removed {
            device.unregister_notifications().await;
        }

        if added.is_empty() && removed.is_empty() {
            return;
        }
        let event = ChangeEvent::DeviceListChanged { added, removed };
        self.hardware.dispatch(event.clone()).await;
        self.hub.dispatch(event).await;
    }

    /// The single serialized critical section mutating the registry.
    fn apply_device_list_diff(&self) -> (Vec<Arc<AudioDevice>>, Vec<Arc<AudioDevice>>) {
        let live_handles = self.hardware.all_device_ids().unwrap_or_default();
        let live: HashMap<String, ObjectId> = live_handles
            .into_iter()
            .filter_map(|handle| {
                self.bridge
                    .get_string(handle, PropertyAddress::global(selectors::DEVICE_UID))
                    .ok()
                    .map(|uid| (uid, handle))
            })
            .collect();

        let (added_handles, removed) = {
            let mut registry = self.lock_registry();
            let added_handles: Vec<ObjectId> = live
                .iter()
                .filter(|(uid, _)| !registry.contains_key(*uid))
                .map(|(_, handle)| *handle)
                .collect();
            let removed_uids: Vec<String> = registry
                .keys()
                .filter(|uid| !live.contains_key(*uid))
                .cloned()
                .collect();
            let removed: Vec<Arc<AudioDevice>> = removed_uids
                .iter()
                .filter_map(|uid| registry.remove(uid))
                .collect();
            (added_handles, removed)
        };

        // Attach outside the registry lock; adopt() re-locks per insert, and
        // reconciliation itself is serialized by the hardware worker.
        let added: Vec<Arc<AudioDevice>> = added_handles
            .into_iter()
            .filter_map(|handle| self.adopt(handle))
            .collect();
        (added, removed)
    }

    pub(crate) async fn handle_default_changed(self: Arc<Self>, kind: DefaultDeviceKind) {
        let manager = self.clone();
        let resolved = tokio::task::spawn_blocking(move || manager.default_device(kind))
            .await
            .ok()
            .flatten();
        let Some(device) = resolved else {
            debug!(?kind, "default-device change points at no known device");
            return;
        };

        let event = match kind {
            DefaultDeviceKind::Input => ChangeEvent::DefaultInputChanged { device },
            DefaultDeviceKind::Output => ChangeEvent::DefaultOutputChanged { device },
            DefaultDeviceKind::SystemOutput => ChangeEvent::DefaultSystemChanged { device },
        };
        self.hardware.dispatch(event.clone()).await;
        self.hub.dispatch(event).await;
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AudioDevice>>> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Per-device events reach the manager through the device hubs; forward them
/// to the manager's own observers unchanged.
#[async_trait]
impl EventObserver for DeviceManager {
    async fn on_change(&self, event: ChangeEvent) {
        self.hub.dispatch(event).await;
    }
}

/// Routes raw hardware-level notifications to the owning manager.
struct HardwareEventHandler {
    manager: Weak<DeviceManager>,
}

#[async_trait]
impl RawEventHandler for HardwareEventHandler {
    async fn handle(&self, raw: RawPropertyEvent) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        match raw.address.selector {
            selectors::DEVICE_LIST => manager.reconcile_device_list().await,
            selectors::DEFAULT_INPUT_DEVICE => {
                manager.handle_default_changed(DefaultDeviceKind::Input).await
            }
            selectors::DEFAULT_OUTPUT_DEVICE => {
                manager.handle_default_changed(DefaultDeviceKind::Output).await
            }
            selectors::DEFAULT_SYSTEM_OUTPUT_DEVICE => {
                manager
                    .handle_default_changed(DefaultDeviceKind::SystemOutput)
                    .await
            }
            other => {
                debug!(
                    selector = %selectors::fourcc_to_string(other),
                    "dropping hardware notification for unhandled selector"
                );
            }
        }
    }
}
