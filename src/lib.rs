//! Typed audio-device control over a property-selector host substrate:
//! enumeration, volume/mute, sample rates, clock sources, exclusive access,
//! default devices, and push-based change notification.

pub mod bridge;
pub mod buffers;
pub mod device;
pub mod error;
pub mod events;
pub mod format;
pub mod hardware;
pub mod manager;
pub mod router;
pub mod substrate;

pub use bridge::PropertyBridge;
pub use device::{AudioDevice, DeviceDescription, DeviceIdentity, VolumeInfo};
pub use error::{ControlError, Result};
pub use events::{
    ChangeEvent, DefaultDeviceKind, Direction, EventObserver, ObserverToken, TransportType,
};
pub use hardware::AudioHardware;
pub use manager::DeviceManager;
pub use router::NotificationRouter;
