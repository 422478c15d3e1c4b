//! Typed change events and the observer seam.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::AudioDevice;
use crate::substrate::{selectors, Scope};

/// Stereo channel pair, `(left, right)`.
pub type StereoPair = (u32, u32);

/// Direction of an audio path. A device may expose both directions at once,
/// so every channel-qualified operation names its direction explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Recording,
}

impl Direction {
    /// The property scope carrying this direction.
    pub fn scope(self) -> Scope {
        match self {
            Direction::Playback => selectors::SCOPE_OUTPUT,
            Direction::Recording => selectors::SCOPE_INPUT,
        }
    }

    /// Maps a scope back to a direction; global and wildcard scopes carry no
    /// direction.
    pub fn from_scope(scope: Scope) -> Option<Self> {
        if scope == selectors::SCOPE_OUTPUT {
            Some(Direction::Playback)
        } else if scope == selectors::SCOPE_INPUT {
            Some(Direction::Recording)
        } else {
            None
        }
    }
}

/// How a device is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    BuiltIn,
    Aggregate,
    Virtual,
    Pci,
    Usb,
    FireWire,
    Bluetooth,
    BluetoothLe,
    Hdmi,
    DisplayPort,
    AirPlay,
    Avb,
    Thunderbolt,
    Unknown,
}

impl TransportType {
    pub fn from_code(code: u32) -> Self {
        match &code.to_be_bytes() {
            b"bltn" => TransportType::BuiltIn,
            b"grup" => TransportType::Aggregate,
            b"virt" => TransportType::Virtual,
            b"pci " => TransportType::Pci,
            b"usb " => TransportType::Usb,
            b"1394" => TransportType::FireWire,
            b"blue" => TransportType::Bluetooth,
            b"blea" => TransportType::BluetoothLe,
            b"hdmi" => TransportType::Hdmi,
            b"dprt" => TransportType::DisplayPort,
            b"airp" => TransportType::AirPlay,
            b"eavb" => TransportType::Avb,
            b"thun" => TransportType::Thunderbolt,
            _ => TransportType::Unknown,
        }
    }
}

/// The three default-device roles the host tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultDeviceKind {
    Input,
    Output,
    SystemOutput,
}

impl DefaultDeviceKind {
    pub fn selector(self) -> crate::substrate::Selector {
        match self {
            DefaultDeviceKind::Input => selectors::DEFAULT_INPUT_DEVICE,
            DefaultDeviceKind::Output => selectors::DEFAULT_OUTPUT_DEVICE,
            DefaultDeviceKind::SystemOutput => selectors::DEFAULT_SYSTEM_OUTPUT_DEVICE,
        }
    }
}

/// A device or hardware change, fully materialized before dispatch.
///
/// Every variant carries the originating device references, so call sites
/// never need to resolve a loosely-typed sender.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    SampleRateChanged {
        device: Arc<AudioDevice>,
    },
    AvailableSampleRatesChanged {
        device: Arc<AudioDevice>,
    },
    ClockSourceChanged {
        device: Arc<AudioDevice>,
        channel: u32,
        direction: Direction,
    },
    NameChanged {
        device: Arc<AudioDevice>,
    },
    VolumeChanged {
        device: Arc<AudioDevice>,
        channel: u32,
        direction: Direction,
    },
    MuteChanged {
        device: Arc<AudioDevice>,
        channel: u32,
        direction: Direction,
    },
    IsAliveChanged {
        device: Arc<AudioDevice>,
    },
    IsRunningChanged {
        device: Arc<AudioDevice>,
    },
    IsRunningSomewhereChanged {
        device: Arc<AudioDevice>,
    },
    HogModeChanged {
        device: Arc<AudioDevice>,
    },
    /// One aggregated event per hardware-list notification; a single
    /// aggregate-device reconfiguration can add and remove several devices
    /// atomically.
    DeviceListChanged {
        added: Vec<Arc<AudioDevice>>,
        removed: Vec<Arc<AudioDevice>>,
    },
    DefaultInputChanged {
        device: Arc<AudioDevice>,
    },
    DefaultOutputChanged {
        device: Arc<AudioDevice>,
    },
    DefaultSystemChanged {
        device: Arc<AudioDevice>,
    },
}

/// Receiver of change events. Register on a device, the hardware facade, or
/// the manager; handlers that were never registered are never invoked.
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_change(&self, event: ChangeEvent);
}

/// Registration token returned by `subscribe`; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverToken(u64);

/// Ordered observer registry shared by the device, hardware, and manager
/// facades.
///
/// Observers are held weakly: dropping the observer is enough to stop
/// deliveries, and the hub prunes dead entries as it goes. Dispatch walks
/// observers in registration order with a snapshot taken up front, so an
/// observer registered or dropped mid-dispatch does not affect the pass.
pub struct ObserverHub {
    observers: Mutex<Vec<(u64, Weak<dyn EventObserver>)>>,
    next_token: Mutex<u64>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_token: Mutex::new(0),
        }
    }

    pub fn subscribe(&self, observer: Weak<dyn EventObserver>) -> ObserverToken {
        let token = {
            let mut next = self.next_token.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            *next
        };
        self.observers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((token, observer));
        ObserverToken(token)
    }

    pub fn unsubscribe(&self, token: ObserverToken) {
        self.observers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|(id, _)| *id != token.0);
    }

    /// Delivers `event` to live observers in registration order, pruning the
    /// ones that have been dropped.
    pub async fn dispatch(&self, event: ChangeEvent) {
        let snapshot: Vec<(u64, Weak<dyn EventObserver>)> = {
            let mut observers = self.observers.lock().unwrap_or_else(|p| p.into_inner());
            observers.retain(|(_, weak)| weak.strong_count() > 0);
            observers.clone()
        };
        for (_, weak) in snapshot {
            if let Some(observer) = weak.upgrade() {
                observer.on_change(event.clone()).await;
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}
