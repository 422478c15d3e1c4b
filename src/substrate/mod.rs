pub mod marshal;
pub mod mock;
pub mod selectors;

pub use marshal::ValueTranslation;
pub use mock::{SimulatedDevice, SimulatedStore};

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Session-local object handle. Valid only until the device is removed or the
/// host reboots; handles may be reused by a different device afterwards.
pub type ObjectId = u32;

/// Property selector, a four-character code.
pub type Selector = u32;

/// Property scope, a four-character code.
pub type Scope = u32;

/// Property element. Element zero addresses the master/aggregate control;
/// non-zero elements address individual channels.
pub type Element = u32;

/// The host object that owns the device list and default-device properties.
pub const SYSTEM_OBJECT: ObjectId = 1;

/// Sentinel for a handle that resolves to nothing.
pub const UNKNOWN_OBJECT: ObjectId = 0;

/// The master/aggregate element.
pub const ELEMENT_MASTER: Element = 0;

/// Full address of a property: selector, scope and element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub selector: Selector,
    pub scope: Scope,
    pub element: Element,
}

impl PropertyAddress {
    pub const fn new(selector: Selector, scope: Scope, element: Element) -> Self {
        Self {
            selector,
            scope,
            element,
        }
    }

    /// Address in the global scope, master element.
    pub const fn global(selector: Selector) -> Self {
        Self::new(selector, selectors::SCOPE_GLOBAL, ELEMENT_MASTER)
    }
}

impl fmt::Display for PropertyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            selectors::fourcc_to_string(self.selector),
            selectors::fourcc_to_string(self.scope),
            self.element
        )
    }
}

/// A raw notification as raised by the substrate: which object changed and at
/// which address. Carries no payload; the typed layer re-reads what it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPropertyEvent {
    pub object: ObjectId,
    pub address: PropertyAddress,
}

/// Callback installed per `(object, selector)` pair. Invoked by the substrate
/// on an arbitrary thread; implementations must return quickly and must not
/// call back into the property store.
pub type RawListener = Arc<dyn Fn(RawPropertyEvent) + Send + Sync>;

/// The native-substrate seam: an object-ID-addressed property store with
/// synchronous byte-level access and asynchronous change listeners.
///
/// `read` and `write` may block on driver IPC. They must never be invoked
/// from inside a delivered-notification callback or a real-time render path.
///
/// The `data` buffer handed to `read` is in-out: for translation selectors
/// (UID lookup, clock-source names, volume-curve conversion) the caller
/// pre-fills it with the input value and the store overwrites it with the
/// result. The returned value is the number of bytes written.
pub trait PropertyStore: Send + Sync + 'static {
    /// Whether the object exposes the addressed property.
    fn has_property(&self, object: ObjectId, address: PropertyAddress) -> bool;

    /// Native size of the property payload in bytes.
    fn property_size(&self, object: ObjectId, address: PropertyAddress) -> Result<u32>;

    /// Whether the property accepts writes.
    fn is_settable(&self, object: ObjectId, address: PropertyAddress) -> Result<bool>;

    /// Read the property into `data`, returning the number of bytes written.
    fn read(&self, object: ObjectId, address: PropertyAddress, data: &mut [u8]) -> Result<u32>;

    /// Write the property from `data`.
    fn write(&self, object: ObjectId, address: PropertyAddress, data: &[u8]) -> Result<()>;

    /// Install `listener` for changes to `selector` on `object`, replacing
    /// any previous listener for that pair.
    fn add_listener(
        &self,
        object: ObjectId,
        selector: Selector,
        listener: RawListener,
    ) -> Result<()>;

    /// Remove the listener for the pair. Once this returns, the listener will
    /// not be invoked again.
    fn remove_listener(&self, object: ObjectId, selector: Selector) -> Result<()>;
}
