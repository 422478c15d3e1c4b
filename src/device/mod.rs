pub mod clock;
pub mod hog;
pub mod sample_rate;
pub mod volume;

pub use volume::VolumeInfo;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::PropertyBridge;
use crate::error::{ControlError, Result};
use crate::events::{
    ChangeEvent, DefaultDeviceKind, Direction, EventObserver, ObserverHub, ObserverToken,
    StereoPair, TransportType,
};
use crate::router::{NotificationRouter, RawEventHandler};
use crate::substrate::{
    selectors, ObjectId, PropertyAddress, PropertyStore, RawPropertyEvent, SYSTEM_OBJECT,
};

/// The dual identity of a device.
///
/// The session handle is only valid until the device is removed or the host
/// reboots, and may be reused by a different device afterwards; the
/// persistent UID never changes for the same device. Lookups by handle must
/// verify the UID still matches rather than trust the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub handle: ObjectId,
    pub uid: String,
}

/// Serializable snapshot of a device, e.g. for persisting a user's device
/// selection across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub uid: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub transport: Option<TransportType>,
    pub input_channels: u32,
    pub output_channels: u32,
    pub nominal_sample_rate: Option<f64>,
}

/// Last-known state served when the live device stops answering. The name
/// snapshot is taken at discovery so it survives disconnection.
struct DeviceCache {
    name: String,
    input_channels: u32,
    output_channels: u32,
    is_alive: bool,
    is_running: bool,
    is_running_somewhere: bool,
}

const FALLBACK_NAME: &str = "Unknown Device";

/// Selectors a device listens on. One native listener per pair, installed at
/// attach, removed at shutdown.
const DEVICE_SELECTORS: &[crate::substrate::Selector] = &[
    selectors::NAME,
    selectors::NOMINAL_SAMPLE_RATE,
    selectors::AVAILABLE_NOMINAL_SAMPLE_RATES,
    selectors::CLOCK_SOURCE,
    selectors::VOLUME_SCALAR,
    selectors::MUTE,
    selectors::DEVICE_IS_ALIVE,
    selectors::DEVICE_IS_RUNNING,
    selectors::DEVICE_IS_RUNNING_SOMEWHERE,
    selectors::HOG_MODE,
];

/// A device present in the system: property access qualified by channel and
/// direction, plus change notification.
///
/// Read accessors go to the live hardware first and fall back to the cached
/// snapshot when the device has become unreachable. Mutators always go live
/// and report success or failure; they never panic.
pub struct AudioDevice {
    bridge: PropertyBridge,
    handle: ObjectId,
    uid: String,
    preferred_direction: Direction,
    cache: Mutex<DeviceCache>,
    hub: ObserverHub,
    router: NotificationRouter,
}

impl AudioDevice {
    /// Builds the facade for the device at `handle` and installs its change
    /// listeners. Fails if the handle does not resolve or the device exposes
    /// no persistent UID. Requires an ambient tokio runtime.
    pub fn attach(store: Arc<dyn PropertyStore>, handle: ObjectId) -> Result<Arc<Self>> {
        let bridge = PropertyBridge::new(store.clone());
        let uid = bridge.get_string(handle, PropertyAddress::global(selectors::DEVICE_UID))?;
        let name = bridge
            .get_string(handle, PropertyAddress::global(selectors::NAME))
            .unwrap_or_else(|_| FALLBACK_NAME.to_string());
        let input_channels = read_channels(&bridge, handle, Direction::Recording);
        let output_channels = read_channels(&bridge, handle, Direction::Playback);

        // Derived once from the capability flags; convenience call sites only.
        let preferred_direction = if output_channels == 0 && input_channels > 0 {
            Direction::Recording
        } else {
            Direction::Playback
        };

        let device = Arc::new_cyclic(|weak: &Weak<AudioDevice>| {
            let handler = Arc::new(DeviceEventHandler {
                device: weak.clone(),
            });
            AudioDevice {
                bridge: bridge.clone(),
                handle,
                uid,
                preferred_direction,
                cache: Mutex::new(DeviceCache {
                    name,
                    input_channels,
                    output_channels,
                    is_alive: true,
                    is_running: false,
                    is_running_somewhere: false,
                }),
                hub: ObserverHub::new(),
                router: NotificationRouter::new(store, handle, handler),
            }
        });
        device.router.register(DEVICE_SELECTORS)?;
        Ok(device)
    }

    /// Resolves a persistent UID to a live device.
    pub fn attach_by_uid(store: Arc<dyn PropertyStore>, uid: &str) -> Result<Arc<Self>> {
        let bridge = PropertyBridge::new(store.clone());
        let handle = bridge.resolve_uid(
            SYSTEM_OBJECT,
            PropertyAddress::global(selectors::DEVICE_FOR_UID),
            uid,
        )?;
        Self::attach(store, handle)
    }

    pub fn handle(&self) -> ObjectId {
        self.handle
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            handle: self.handle,
            uid: self.uid.clone(),
        }
    }

    /// Whether the session handle still belongs to this device. False once
    /// the handle has gone stale or been reused.
    pub fn verify_identity(&self) -> bool {
        self.bridge
            .get_string(self.handle, PropertyAddress::global(selectors::DEVICE_UID))
            .map(|live| live == self.uid)
            .unwrap_or(false)
    }

    pub(crate) fn bridge(&self) -> &PropertyBridge {
        &self.bridge
    }

    pub(crate) fn hub(&self) -> &ObserverHub {
        &self.hub
    }

    /// The device name; the discovery-time snapshot if the device stopped
    /// answering.
    pub fn name(&self) -> String {
        match self
            .bridge
            .get_string(self.handle, PropertyAddress::global(selectors::NAME))
        {
            Ok(name) => {
                self.cache_mut().name = name.clone();
                name
            }
            Err(_) => self.cache_mut().name.clone(),
        }
    }

    pub fn manufacturer(&self) -> Result<String> {
        self.bridge
            .get_string(self.handle, PropertyAddress::global(selectors::MANUFACTURER))
    }

    pub fn model_uid(&self) -> Result<String> {
        self.bridge
            .get_string(self.handle, PropertyAddress::global(selectors::MODEL_UID))
    }

    pub fn transport_type(&self) -> Result<TransportType> {
        self.bridge
            .get_u32(self.handle, PropertyAddress::global(selectors::TRANSPORT_TYPE))
            .map(TransportType::from_code)
    }

    /// Hidden devices are excluded from the normal device list and only
    /// reachable through their UID.
    pub fn is_hidden(&self) -> bool {
        self.bridge
            .get_bool(self.handle, PropertyAddress::global(selectors::IS_HIDDEN))
            .unwrap_or(false)
    }

    /// Human-readable name of one channel, when the driver provides one.
    pub fn channel_name(&self, channel: u32, direction: Direction) -> Result<String> {
        self.bridge.get_string(
            self.handle,
            PropertyAddress::new(selectors::ELEMENT_NAME, direction.scope(), channel),
        )
    }

    pub fn related_device_ids(&self) -> Result<Vec<ObjectId>> {
        self.bridge
            .get_u32_array(self.handle, PropertyAddress::global(selectors::RELATED_DEVICES))
    }

    /// Channel count for a direction; cached capability on failure.
    pub fn channels(&self, direction: Direction) -> u32 {
        match self.bridge.get_u32(
            self.handle,
            PropertyAddress::new(selectors::CHANNEL_LAYOUT, direction.scope(), 0),
        ) {
            Ok(count) => {
                let mut cache = self.cache_mut();
                match direction {
                    Direction::Recording => cache.input_channels = count,
                    Direction::Playback => cache.output_channels = count,
                }
                count
            }
            Err(ControlError::PropertyNotSupported { .. }) => 0,
            Err(_) => match direction {
                Direction::Recording => self.cache_mut().input_channels,
                Direction::Playback => self.cache_mut().output_channels,
            },
        }
    }

    pub fn has_input(&self) -> bool {
        self.channels(Direction::Recording) > 0
    }

    pub fn has_output(&self) -> bool {
        self.channels(Direction::Playback) > 0
    }

    pub fn is_input_only(&self) -> bool {
        !self.has_output() && self.has_input()
    }

    pub fn is_output_only(&self) -> bool {
        !self.has_input() && self.has_output()
    }

    /// Direction hint for single-direction devices, derived once at attach.
    pub fn preferred_direction(&self) -> Direction {
        self.preferred_direction
    }

    pub fn is_alive(&self) -> bool {
        self.flag(selectors::DEVICE_IS_ALIVE, |cache| cache.is_alive)
    }

    pub fn is_running(&self) -> bool {
        self.flag(selectors::DEVICE_IS_RUNNING, |cache| cache.is_running)
    }

    /// Whether any process has the device running.
    pub fn is_running_somewhere(&self) -> bool {
        self.flag(selectors::DEVICE_IS_RUNNING_SOMEWHERE, |cache| {
            cache.is_running_somewhere
        })
    }

    pub fn latency(&self, direction: Direction) -> Result<u32> {
        self.bridge.get_u32(
            self.handle,
            PropertyAddress::new(selectors::LATENCY, direction.scope(), 0),
        )
    }

    pub fn safety_offset(&self, direction: Direction) -> Result<u32> {
        self.bridge.get_u32(
            self.handle,
            PropertyAddress::new(selectors::SAFETY_OFFSET, direction.scope(), 0),
        )
    }

    /// The channel pair that best represents stereo for this direction,
    /// usually channels 1 and 2.
    pub fn preferred_stereo_channels(&self, direction: Direction) -> Result<StereoPair> {
        let address = PropertyAddress::new(
            selectors::PREFERRED_CHANNELS_FOR_STEREO,
            direction.scope(),
            0,
        );
        let channels = self.bridge.get_u32_array(self.handle, address)?;
        if channels.len() != 2 {
            return Err(ControlError::PropertyNotSupported {
                object: self.handle,
                address,
            });
        }
        Ok((channels[0], channels[1]))
    }

    /// Promotes this device to one of the default-device roles.
    pub fn set_as_default(&self, kind: DefaultDeviceKind) -> Result<()> {
        self.bridge.set_u32(
            SYSTEM_OBJECT,
            PropertyAddress::global(kind.selector()),
            self.handle,
        )
    }

    pub fn describe(&self) -> DeviceDescription {
        DeviceDescription {
            uid: self.uid.clone(),
            name: self.name(),
            manufacturer: self.manufacturer().ok(),
            transport: self.transport_type().ok(),
            input_channels: self.channels(Direction::Recording),
            output_channels: self.channels(Direction::Playback),
            nominal_sample_rate: self.nominal_sample_rate().ok(),
        }
    }

    /// Registers an observer for this device's events. The device holds the
    /// observer weakly; dropping the observer stops deliveries.
    pub fn subscribe(&self, observer: &Arc<dyn EventObserver>) -> ObserverToken {
        self.hub.subscribe(Arc::downgrade(observer))
    }

    pub fn unsubscribe(&self, token: ObserverToken) {
        self.hub.unsubscribe(token);
    }

    /// Tears down the native listeners and drains pending notifications.
    /// After this returns, no further event for this device is delivered.
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
    }

    pub(crate) async fn unregister_notifications(&self) {
        self.router.unregister().await;
    }

    fn flag(&self, selector: crate::substrate::Selector, cached: fn(&DeviceCache) -> bool) -> bool {
        match self
            .bridge
            .get_bool(self.handle, PropertyAddress::global(selector))
        {
            Ok(value) => {
                let mut cache = self.cache_mut();
                match selector {
                    s if s == selectors::DEVICE_IS_ALIVE => cache.is_alive = value,
                    s if s == selectors::DEVICE_IS_RUNNING => cache.is_running = value,
                    _ => cache.is_running_somewhere = value,
                }
                value
            }
            Err(ControlError::Unreachable(_)) => cached(&self.cache_mut()),
            Err(_) => false,
        }
    }

    fn cache_mut(&self) -> std::sync::MutexGuard<'_, DeviceCache> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn address(&self, selector: crate::substrate::Selector, channel: u32, direction: Direction) -> PropertyAddress {
        PropertyAddress::new(selector, direction.scope(), channel)
    }
}

impl fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache_mut();
        write!(f, "{} ({})", cache.name, self.handle)
    }
}

fn read_channels(bridge: &PropertyBridge, handle: ObjectId, direction: Direction) -> u32 {
    bridge
        .get_u32(
            handle,
            PropertyAddress::new(selectors::CHANNEL_LAYOUT, direction.scope(), 0),
        )
        .unwrap_or(0)
}

/// Translates raw notifications for one device into typed events, on the
/// device's worker. Property re-reads run under a blocking task so the async
/// worker never stalls, and they are awaited in order so per-device delivery
/// order matches raise order.
struct DeviceEventHandler {
    device: Weak<AudioDevice>,
}

#[async_trait]
impl RawEventHandler for DeviceEventHandler {
    async fn handle(&self, raw: RawPropertyEvent) {
        let Some(device) = self.device.upgrade() else {
            return;
        };

        let event = match raw.address.selector {
            selectors::NAME => {
                refresh(&device, |d| {
                    d.name();
                })
                .await;
                Some(ChangeEvent::NameChanged { device: device.clone() })
            }
            selectors::NOMINAL_SAMPLE_RATE => {
                Some(ChangeEvent::SampleRateChanged { device: device.clone() })
            }
            selectors::AVAILABLE_NOMINAL_SAMPLE_RATES => {
                Some(ChangeEvent::AvailableSampleRatesChanged { device: device.clone() })
            }
            selectors::CLOCK_SOURCE => {
                Direction::from_scope(raw.address.scope).map(|direction| {
                    ChangeEvent::ClockSourceChanged {
                        device: device.clone(),
                        channel: raw.address.element,
                        direction,
                    }
                })
            }
            selectors::VOLUME_SCALAR => {
                Direction::from_scope(raw.address.scope).map(|direction| {
                    ChangeEvent::VolumeChanged {
                        device: device.clone(),
                        channel: raw.address.element,
                        direction,
                    }
                })
            }
            selectors::MUTE => Direction::from_scope(raw.address.scope).map(|direction| {
                ChangeEvent::MuteChanged {
                    device: device.clone(),
                    channel: raw.address.element,
                    direction,
                }
            }),
            selectors::DEVICE_IS_ALIVE => {
                refresh(&device, |d| {
                    d.is_alive();
                })
                .await;
                Some(ChangeEvent::IsAliveChanged { device: device.clone() })
            }
            selectors::DEVICE_IS_RUNNING => {
                refresh(&device, |d| {
                    d.is_running();
                })
                .await;
                Some(ChangeEvent::IsRunningChanged { device: device.clone() })
            }
            selectors::DEVICE_IS_RUNNING_SOMEWHERE => {
                refresh(&device, |d| {
                    d.is_running_somewhere();
                })
                .await;
                Some(ChangeEvent::IsRunningSomewhereChanged { device: device.clone() })
            }
            selectors::HOG_MODE => Some(ChangeEvent::HogModeChanged { device: device.clone() }),
            other => {
                debug!(
                    selector = %selectors::fourcc_to_string(other),
                    "dropping notification for unhandled selector"
                );
                None
            }
        };

        if let Some(event) = event {
            device.hub.dispatch(event).await;
        }
    }
}

/// Runs a blocking cache refresh off the async worker thread.
async fn refresh(device: &Arc<AudioDevice>, f: fn(&AudioDevice)) {
    let device = device.clone();
    let _ = tokio::task::spawn_blocking(move || f(&device)).await;
}
