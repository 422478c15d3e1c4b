//! System-wide hardware facade: enumeration and default devices.
//!
//! Enumeration and the direction filters are evaluated fresh on every call;
//! instance caching belongs to the manager, not here. One notification
//! subscription covering the device-list and default-device selectors is
//! installed at construction and removed at shutdown.

use std::sync::Arc;

use tracing::warn;

use crate::bridge::PropertyBridge;
use crate::error::Result;
use crate::events::{ChangeEvent, DefaultDeviceKind, Direction, EventObserver, ObserverHub, ObserverToken};
use crate::router::{NotificationRouter, RawEventHandler};
use crate::substrate::{
    selectors, ObjectId, PropertyAddress, PropertyStore, Selector, SYSTEM_OBJECT, UNKNOWN_OBJECT,
};

const HARDWARE_SELECTORS: &[Selector] = &[
    selectors::DEVICE_LIST,
    selectors::DEFAULT_INPUT_DEVICE,
    selectors::DEFAULT_OUTPUT_DEVICE,
    selectors::DEFAULT_SYSTEM_OUTPUT_DEVICE,
];

pub struct AudioHardware {
    bridge: PropertyBridge,
    router: NotificationRouter,
    hub: ObserverHub,
}

impl AudioHardware {
    /// Builds the facade and installs the hardware-level subscription,
    /// routing raw notifications into `handler`. Selectors the host refuses
    /// to watch are logged by the router and skipped.
    pub(crate) fn with_handler(
        store: Arc<dyn PropertyStore>,
        handler: Arc<dyn RawEventHandler>,
    ) -> Arc<Self> {
        let hardware = Arc::new(Self {
            bridge: PropertyBridge::new(store.clone()),
            router: NotificationRouter::new(store, SYSTEM_OBJECT, handler),
            hub: ObserverHub::new(),
        });
        if let Err(err) = hardware.router.register(HARDWARE_SELECTORS) {
            warn!(%err, "hardware notification subscription failed");
        }
        hardware
    }

    /// Session handles of every device currently present, hidden ones
    /// excluded by the host.
    pub fn all_device_ids(&self) -> Result<Vec<ObjectId>> {
        self.bridge
            .get_u32_array(SYSTEM_OBJECT, PropertyAddress::global(selectors::DEVICE_LIST))
    }

    /// Handles of devices with at least one input channel.
    pub fn input_device_ids(&self) -> Result<Vec<ObjectId>> {
        self.device_ids_for(Direction::Recording)
    }

    /// Handles of devices with at least one output channel.
    pub fn output_device_ids(&self) -> Result<Vec<ObjectId>> {
        self.device_ids_for(Direction::Playback)
    }

    /// The device currently filling a default role, or `None` when the role
    /// is unassigned.
    pub fn default_device_id(&self, kind: DefaultDeviceKind) -> Result<Option<ObjectId>> {
        let handle = self
            .bridge
            .get_u32(SYSTEM_OBJECT, PropertyAddress::global(kind.selector()))?;
        Ok((handle != UNKNOWN_OBJECT).then_some(handle))
    }

    /// Assigns a default role to the device at `handle`.
    pub fn set_default_device(&self, kind: DefaultDeviceKind, handle: ObjectId) -> Result<()> {
        self.bridge
            .set_u32(SYSTEM_OBJECT, PropertyAddress::global(kind.selector()), handle)
    }

    /// Registers an observer for hardware-level events (device list and
    /// default-device changes). Held weakly.
    pub fn subscribe(&self, observer: &Arc<dyn EventObserver>) -> ObserverToken {
        self.hub.subscribe(Arc::downgrade(observer))
    }

    pub fn unsubscribe(&self, token: ObserverToken) {
        self.hub.unsubscribe(token);
    }

    pub(crate) async fn dispatch(&self, event: ChangeEvent) {
        self.hub.dispatch(event).await;
    }

    pub(crate) async fn shutdown(&self) {
        self.router.shutdown().await;
    }

    fn device_ids_for(&self, direction: Direction) -> Result<Vec<ObjectId>> {
        let ids = self.all_device_ids()?;
        Ok(ids
            .into_iter()
            .filter(|id| {
                self.bridge
                    .get_u32(
                        *id,
                        PropertyAddress::new(selectors::CHANNEL_LAYOUT, direction.scope(), 0),
                    )
                    .map(|channels| channels > 0)
                    .unwrap_or(false)
            })
            .collect())
    }
}
