//! In-memory property store used by tests and demos.
//!
//! `SimulatedStore` honors the same contract a real host does: property
//! values live in per-object tables, writes raise change notifications, and
//! notifications are delivered on a dedicated pump thread (never the mutating
//! thread) in raise order. `remove_listener` drains in-flight deliveries
//! before returning, so callers can rely on never being invoked afterwards.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use tracing::warn;

use super::marshal::{self, RateRange, ValueTranslation};
use super::selectors::{self, SCOPE_INPUT, SCOPE_OUTPUT};
use super::{
    ObjectId, PropertyAddress, PropertyStore, RawListener, RawPropertyEvent, Selector,
    ELEMENT_MASTER, SYSTEM_OBJECT, UNKNOWN_OBJECT,
};
use crate::error::{ControlError, Result};

/// Description of a device to install into a `SimulatedStore`.
pub struct SimulatedDevice {
    uid: String,
    name: String,
    manufacturer: String,
    model_uid: String,
    transport: u32,
    input_channels: u32,
    output_channels: u32,
    nominal_rate: f64,
    rate_ranges: Vec<RateRange>,
    clock_sources: Vec<String>,
    db_range: (f32, f32),
    initial_volume: f32,
    volume_settable: bool,
    mute_supported: bool,
    rate_settable: bool,
    latency: (u32, u32),
    safety_offset: (u32, u32),
    channel_names: Vec<String>,
    hidden: bool,
}

impl SimulatedDevice {
    pub fn new(uid: &str, name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            manufacturer: "Simulated Audio Co.".to_string(),
            model_uid: format!("{uid}:model"),
            transport: selectors::fourcc(b"virt"),
            input_channels: 0,
            output_channels: 2,
            nominal_rate: 44_100.0,
            rate_ranges: vec![(44_100.0, 44_100.0), (48_000.0, 48_000.0)],
            clock_sources: vec!["Internal Clock".to_string()],
            db_range: (-96.0, 0.0),
            initial_volume: 0.5,
            volume_settable: true,
            mute_supported: true,
            rate_settable: true,
            latency: (0, 0),
            safety_offset: (0, 0),
            channel_names: Vec::new(),
            hidden: false,
        }
    }

    pub fn input_channels(mut self, channels: u32) -> Self {
        self.input_channels = channels;
        self
    }

    pub fn output_channels(mut self, channels: u32) -> Self {
        self.output_channels = channels;
        self
    }

    pub fn manufacturer(mut self, name: &str) -> Self {
        self.manufacturer = name.to_string();
        self
    }

    pub fn transport(mut self, code: u32) -> Self {
        self.transport = code;
        self
    }

    /// Replaces the supported rates with discrete values.
    pub fn sample_rates(mut self, rates: &[f64]) -> Self {
        self.rate_ranges = rates.iter().map(|r| (*r, *r)).collect();
        self
    }

    /// Adds a continuous supported-rate range, as range-reporting drivers do.
    pub fn sample_rate_range(mut self, lo: f64, hi: f64) -> Self {
        self.rate_ranges.push((lo, hi));
        self
    }

    pub fn nominal_rate(mut self, rate: f64) -> Self {
        self.nominal_rate = rate;
        self
    }

    pub fn clock_sources(mut self, names: &[&str]) -> Self {
        self.clock_sources = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Decibel range of the volume curve, `(min_db, max_db)`.
    pub fn db_range(mut self, min_db: f32, max_db: f32) -> Self {
        self.db_range = (min_db, max_db);
        self
    }

    pub fn initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = volume;
        self
    }

    /// Volume controls report not-settable, as fixed-gain interfaces do.
    pub fn read_only_volume(mut self) -> Self {
        self.volume_settable = false;
        self
    }

    pub fn no_mute(mut self) -> Self {
        self.mute_supported = false;
        self
    }

    /// Sample rate reports not-settable.
    pub fn fixed_sample_rate(mut self) -> Self {
        self.rate_settable = false;
        self
    }

    pub fn latency_frames(mut self, input: u32, output: u32) -> Self {
        self.latency = (input, output);
        self
    }

    pub fn safety_offset_frames(mut self, input: u32, output: u32) -> Self {
        self.safety_offset = (input, output);
        self
    }

    /// Driver-provided names for the numbered channels, in channel order.
    pub fn channel_names(mut self, names: &[&str]) -> Self {
        self.channel_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Hidden devices are left out of the device list and are reachable only
    /// through their UID.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Default)]
struct ObjectState {
    properties: HashMap<PropertyAddress, Vec<u8>>,
    settable: HashSet<PropertyAddress>,
    clock_names: HashMap<u32, String>,
    db_range: (f32, f32),
    unreachable: bool,
}

impl ObjectState {
    fn put(&mut self, address: PropertyAddress, value: Vec<u8>, settable: bool) {
        self.properties.insert(address, value);
        if settable {
            self.settable.insert(address);
        }
    }
}

enum PumpMsg {
    Deliver(RawListener, RawPropertyEvent),
    Flush(Sender<()>),
    Quit,
}

struct Inner {
    objects: HashMap<ObjectId, ObjectState>,
    listeners: HashMap<(ObjectId, Selector), RawListener>,
    next_handle: ObjectId,
}

/// The simulated host. Cloneable via `Arc`; drop stops the pump thread.
pub struct SimulatedStore {
    inner: Mutex<Inner>,
    pump_tx: Sender<PumpMsg>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedStore {
    pub fn new() -> Self {
        let mut objects = HashMap::new();
        let mut system = ObjectState::default();
        system.put(
            PropertyAddress::global(selectors::DEVICE_LIST),
            Vec::new(),
            false,
        );
        for selector in [
            selectors::DEFAULT_INPUT_DEVICE,
            selectors::DEFAULT_OUTPUT_DEVICE,
            selectors::DEFAULT_SYSTEM_OUTPUT_DEVICE,
        ] {
            system.put(
                PropertyAddress::global(selector),
                marshal::encode_u32(UNKNOWN_OBJECT),
                true,
            );
        }
        objects.insert(SYSTEM_OBJECT, system);

        let (pump_tx, pump_rx) = unbounded::<PumpMsg>();
        let pump = std::thread::Builder::new()
            .name("sim-store-pump".to_string())
            .spawn(move || {
                while let Ok(msg) = pump_rx.recv() {
                    match msg {
                        PumpMsg::Deliver(listener, event) => listener(event),
                        PumpMsg::Flush(ack) => {
                            let _ = ack.send(());
                        }
                        PumpMsg::Quit => break,
                    }
                }
            })
            .expect("failed to spawn simulated store pump thread");

        Self {
            inner: Mutex::new(Inner {
                objects,
                listeners: HashMap::new(),
                next_handle: SYSTEM_OBJECT + 1,
            }),
            pump_tx,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Installs a device at a fresh handle, raising a device-list change.
    pub fn install(&self, device: SimulatedDevice) -> ObjectId {
        let handle = {
            let mut inner = self.lock();
            let handle = inner.next_handle;
            inner.next_handle += 1;
            handle
        };
        self.install_at(handle, device);
        handle
    }

    /// Installs a device at a specific handle. Reusing a handle that belonged
    /// to a removed device models the staleness hazard session handles carry.
    pub fn install_at(&self, handle: ObjectId, device: SimulatedDevice) {
        let raises = {
            let mut inner = self.lock();
            let hidden = device.hidden;
            let state = build_object(handle, &device);
            inner.objects.insert(handle, state);
            inner.next_handle = inner.next_handle.max(handle + 1);
            if hidden {
                return;
            }

            let mut list = device_list(&inner);
            if !list.contains(&handle) {
                list.push(handle);
            }
            store_device_list(&mut inner, &list);
            inner.raise(SYSTEM_OBJECT, PropertyAddress::global(selectors::DEVICE_LIST))
        };
        self.post(raises);
    }

    /// Removes the device and raises a device-list change. Subsequent calls
    /// addressing the handle fail with `InvalidObjectReference`.
    pub fn unplug(&self, handle: ObjectId) {
        let raises = {
            let mut inner = self.lock();
            inner.objects.remove(&handle);
            let list: Vec<ObjectId> = device_list(&inner)
                .into_iter()
                .filter(|h| *h != handle)
                .collect();
            store_device_list(&mut inner, &list);
            inner.raise(SYSTEM_OBJECT, PropertyAddress::global(selectors::DEVICE_LIST))
        };
        self.post(raises);
    }

    /// Applies several additions and removals as one atomic device-list
    /// change with a single notification, the way an aggregate-device
    /// reconfiguration arrives. Returns the handles of the added devices.
    pub fn reconfigure(
        &self,
        adds: Vec<SimulatedDevice>,
        removes: &[ObjectId],
    ) -> Vec<ObjectId> {
        let (handles, raises) = {
            let mut inner = self.lock();
            let mut list = device_list(&inner);

            for handle in removes {
                inner.objects.remove(handle);
                list.retain(|h| h != handle);
            }

            let mut handles = Vec::with_capacity(adds.len());
            for device in adds {
                let handle = inner.next_handle;
                inner.next_handle += 1;
                let state = build_object(handle, &device);
                inner.objects.insert(handle, state);
                list.push(handle);
                handles.push(handle);
            }

            store_device_list(&mut inner, &list);
            let raises =
                inner.raise(SYSTEM_OBJECT, PropertyAddress::global(selectors::DEVICE_LIST));
            (handles, raises)
        };
        self.post(raises);
        handles
    }

    /// Marks the device present but unresponsive; reads and writes fail with
    /// `Unreachable` until cleared.
    pub fn set_unreachable(&self, handle: ObjectId, unreachable: bool) {
        let mut inner = self.lock();
        if let Some(state) = inner.objects.get_mut(&handle) {
            state.unreachable = unreachable;
        }
    }

    /// Renames a device and raises the name-change notification.
    pub fn rename(&self, handle: ObjectId, name: &str) {
        let address = PropertyAddress::global(selectors::NAME);
        let raises = {
            let mut inner = self.lock();
            let Some(state) = inner.objects.get_mut(&handle) else {
                return;
            };
            state
                .properties
                .insert(address, marshal::encode_string(name));
            inner.raise(handle, address)
        };
        self.post(raises);
    }

    pub fn set_alive(&self, handle: ObjectId, alive: bool) {
        self.set_flag(handle, selectors::DEVICE_IS_ALIVE, alive);
    }

    pub fn set_running(&self, handle: ObjectId, running: bool) {
        self.set_flag(handle, selectors::DEVICE_IS_RUNNING, running);
    }

    pub fn set_running_somewhere(&self, handle: ObjectId, running: bool) {
        self.set_flag(handle, selectors::DEVICE_IS_RUNNING_SOMEWHERE, running);
    }

    /// Points a default-device selector at `handle` and raises the change.
    pub fn set_default(&self, selector: Selector, handle: ObjectId) {
        let address = PropertyAddress::global(selector);
        let raises = {
            let mut inner = self.lock();
            let Some(system) = inner.objects.get_mut(&SYSTEM_OBJECT) else {
                return;
            };
            system.properties.insert(address, marshal::encode_u32(handle));
            inner.raise(SYSTEM_OBJECT, address)
        };
        self.post(raises);
    }

    /// Raises a notification without mutating anything, e.g. for selectors
    /// the typed layer does not know.
    pub fn raise(&self, object: ObjectId, address: PropertyAddress) {
        let raises = self.lock().raise(object, address);
        self.post(raises);
    }

    /// Number of currently installed native listeners.
    pub fn active_listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn device_handles(&self) -> Vec<ObjectId> {
        device_list(&self.lock())
    }

    fn set_flag(&self, handle: ObjectId, selector: Selector, value: bool) {
        let address = PropertyAddress::global(selector);
        let raises = {
            let mut inner = self.lock();
            let Some(state) = inner.objects.get_mut(&handle) else {
                return;
            };
            state
                .properties
                .insert(address, marshal::encode_u32(value as u32));
            inner.raise(handle, address)
        };
        self.post(raises);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn post(&self, raises: Vec<(RawListener, RawPropertyEvent)>) {
        for (listener, event) in raises {
            let _ = self.pump_tx.send(PumpMsg::Deliver(listener, event));
        }
    }

    fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.pump_tx.send(PumpMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Default for SimulatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedStore {
    fn drop(&mut self) {
        let _ = self.pump_tx.send(PumpMsg::Quit);
        if let Some(handle) = self.pump.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

impl Inner {
    /// Collects the delivery for a raise; the caller posts it to the pump
    /// after releasing the table lock.
    fn raise(
        &self,
        object: ObjectId,
        address: PropertyAddress,
    ) -> Vec<(RawListener, RawPropertyEvent)> {
        self.listeners
            .get(&(object, address.selector))
            .map(|listener| {
                (
                    listener.clone(),
                    RawPropertyEvent { object, address },
                )
            })
            .into_iter()
            .collect()
    }

    fn object(&self, object: ObjectId) -> Result<&ObjectState> {
        self.objects
            .get(&object)
            .ok_or(ControlError::InvalidObjectReference(object))
    }

    fn reachable(&self, object: ObjectId) -> Result<&ObjectState> {
        let state = self.object(object)?;
        if state.unreachable {
            return Err(ControlError::Unreachable(object));
        }
        Ok(state)
    }
}

impl PropertyStore for SimulatedStore {
    fn has_property(&self, object: ObjectId, address: PropertyAddress) -> bool {
        let inner = self.lock();
        let Ok(state) = inner.object(object) else {
            return false;
        };
        if is_translation(address.selector) {
            return translation_supported(object, address.selector, state);
        }
        if address.selector == selectors::VOLUME_DECIBELS {
            let scalar = PropertyAddress::new(
                selectors::VOLUME_SCALAR,
                address.scope,
                address.element,
            );
            return state.properties.contains_key(&scalar);
        }
        state.properties.contains_key(&address)
    }

    fn property_size(&self, object: ObjectId, address: PropertyAddress) -> Result<u32> {
        let inner = self.lock();
        let state = inner.reachable(object)?;
        if is_translation(address.selector) {
            if !translation_supported(object, address.selector, state) {
                return Err(ControlError::PropertyNotSupported { object, address });
            }
            return Ok(translation_size(address.selector));
        }
        if address.selector == selectors::VOLUME_DECIBELS {
            return Ok(4);
        }
        state
            .properties
            .get(&address)
            .map(|v| v.len() as u32)
            .ok_or(ControlError::PropertyNotSupported { object, address })
    }

    fn is_settable(&self, object: ObjectId, address: PropertyAddress) -> Result<bool> {
        let inner = self.lock();
        let state = inner.reachable(object)?;
        if !state.properties.contains_key(&address) {
            return Err(ControlError::PropertyNotSupported { object, address });
        }
        Ok(state.settable.contains(&address))
    }

    fn read(&self, object: ObjectId, address: PropertyAddress, data: &mut [u8]) -> Result<u32> {
        let inner = self.lock();
        let state = inner.reachable(object)?;

        match address.selector {
            selectors::DEVICE_FOR_UID if object == SYSTEM_OBJECT => {
                let frame = ValueTranslation::from_bytes(data)?;
                if frame.output_size != 4 {
                    return Err(ControlError::SizeMismatch {
                        expected: 4,
                        got: frame.output_size,
                    });
                }
                // Safe: frames are built by PropertyBridge over live buffers
                // for the duration of this synchronous call.
                let uid = marshal::decode_string(unsafe { frame.input() })?;
                let resolved = resolve_uid(&inner, &uid).unwrap_or(UNKNOWN_OBJECT);
                unsafe { frame.output() }.copy_from_slice(&marshal::encode_u32(resolved));
                Ok(4)
            }
            selectors::CLOCK_SOURCE_NAME_FOR_ID => {
                let frame = ValueTranslation::from_bytes(data)?;
                let id = marshal::decode_u32(unsafe { frame.input() })?;
                let name = state.clock_names.get(&id).ok_or(
                    ControlError::PropertyNotSupported { object, address },
                )?;
                let bytes = marshal::encode_string(name);
                if bytes.len() as u32 > frame.output_size {
                    return Err(ControlError::SizeMismatch {
                        expected: bytes.len() as u32,
                        got: frame.output_size,
                    });
                }
                (unsafe { frame.output() })[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len() as u32)
            }
            selectors::VOLUME_SCALAR_TO_DECIBELS => {
                require_volume(state, object, address)?;
                let scalar = marshal::decode_f32(data)?.clamp(0.0, 1.0);
                let (min_db, max_db) = state.db_range;
                let db = min_db + (max_db - min_db) * scalar;
                data.copy_from_slice(&marshal::encode_f32(db));
                Ok(4)
            }
            selectors::VOLUME_DECIBELS_TO_SCALAR => {
                require_volume(state, object, address)?;
                let db = marshal::decode_f32(data)?;
                let (min_db, max_db) = state.db_range;
                let scalar = ((db - min_db) / (max_db - min_db)).clamp(0.0, 1.0);
                data.copy_from_slice(&marshal::encode_f32(scalar));
                Ok(4)
            }
            selectors::VOLUME_DECIBELS => {
                require_volume(state, object, address)?;
                let scalar_addr = PropertyAddress::new(
                    selectors::VOLUME_SCALAR,
                    address.scope,
                    address.element,
                );
                let scalar = marshal::decode_f32(&state.properties[&scalar_addr])?;
                let (min_db, max_db) = state.db_range;
                let db = min_db + (max_db - min_db) * scalar;
                copy_value(&marshal::encode_f32(db), data)
            }
            _ => {
                let value = state
                    .properties
                    .get(&address)
                    .ok_or(ControlError::PropertyNotSupported { object, address })?;
                copy_value(value, data)
            }
        }
    }

    fn write(&self, object: ObjectId, address: PropertyAddress, data: &[u8]) -> Result<()> {
        let raises = {
            let mut inner = self.lock();
            // Borrow-check friendly: validate against the immutable view
            // before mutating.
            {
                let state = inner.reachable(object)?;
                let value = state
                    .properties
                    .get(&address)
                    .ok_or(ControlError::PropertyNotSupported { object, address })?;
                if !state.settable.contains(&address) {
                    return Err(ControlError::PropertyNotSettable { object, address });
                }
                if value.len() != data.len() {
                    return Err(ControlError::SizeMismatch {
                        expected: value.len() as u32,
                        got: data.len() as u32,
                    });
                }
                if address.selector == selectors::HOG_MODE {
                    let holder = marshal::decode_i32(value)?;
                    let claimant = marshal::decode_i32(data)?;
                    if holder != -1 && claimant != -1 && claimant != holder {
                        return Err(ControlError::PermissionDenied { holder });
                    }
                }
            }

            let state = inner
                .objects
                .get_mut(&object)
                .ok_or(ControlError::InvalidObjectReference(object))?;
            state.properties.insert(address, data.to_vec());

            // The running rate follows the nominal rate immediately in the
            // simulation; real clocks settle asynchronously.
            if address.selector == selectors::NOMINAL_SAMPLE_RATE {
                let actual = PropertyAddress::global(selectors::ACTUAL_SAMPLE_RATE);
                state.properties.insert(actual, data.to_vec());
            }

            inner.raise(object, address)
        };
        self.post(raises);
        Ok(())
    }

    fn add_listener(
        &self,
        object: ObjectId,
        selector: Selector,
        listener: RawListener,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.object(object)?;
        if inner.listeners.insert((object, selector), listener).is_some() {
            warn!(object, selector = %selectors::fourcc_to_string(selector),
                "replaced an existing native listener");
        }
        Ok(())
    }

    fn remove_listener(&self, object: ObjectId, selector: Selector) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.listeners.remove(&(object, selector));
        }
        // Drain deliveries already queued so the listener is never invoked
        // after this returns.
        self.flush();
        Ok(())
    }
}

fn is_translation(selector: Selector) -> bool {
    matches!(
        selector,
        selectors::DEVICE_FOR_UID | selectors::CLOCK_SOURCE_NAME_FOR_ID
    ) || matches!(
        selector,
        selectors::VOLUME_SCALAR_TO_DECIBELS | selectors::VOLUME_DECIBELS_TO_SCALAR
    )
}

fn translation_supported(object: ObjectId, selector: Selector, state: &ObjectState) -> bool {
    match selector {
        selectors::DEVICE_FOR_UID => object == SYSTEM_OBJECT,
        selectors::CLOCK_SOURCE_NAME_FOR_ID => !state.clock_names.is_empty(),
        _ => state
            .properties
            .keys()
            .any(|a| a.selector == selectors::VOLUME_SCALAR),
    }
}

fn translation_size(selector: Selector) -> u32 {
    match selector {
        selectors::DEVICE_FOR_UID | selectors::CLOCK_SOURCE_NAME_FOR_ID => {
            mem::size_of::<ValueTranslation>() as u32
        }
        _ => 4,
    }
}

fn require_volume(state: &ObjectState, object: ObjectId, address: PropertyAddress) -> Result<()> {
    let scalar = PropertyAddress::new(selectors::VOLUME_SCALAR, address.scope, address.element);
    if state.properties.contains_key(&scalar) {
        Ok(())
    } else {
        Err(ControlError::PropertyNotSupported { object, address })
    }
}

fn copy_value(value: &[u8], data: &mut [u8]) -> Result<u32> {
    if data.len() != value.len() {
        return Err(ControlError::SizeMismatch {
            expected: value.len() as u32,
            got: data.len() as u32,
        });
    }
    data.copy_from_slice(value);
    Ok(value.len() as u32)
}

fn device_list(inner: &Inner) -> Vec<ObjectId> {
    inner
        .objects
        .get(&SYSTEM_OBJECT)
        .and_then(|s| {
            s.properties
                .get(&PropertyAddress::global(selectors::DEVICE_LIST))
        })
        .and_then(|v| marshal::decode_u32_array(v).ok())
        .unwrap_or_default()
}

fn store_device_list(inner: &mut Inner, list: &[ObjectId]) {
    if let Some(system) = inner.objects.get_mut(&SYSTEM_OBJECT) {
        system.properties.insert(
            PropertyAddress::global(selectors::DEVICE_LIST),
            marshal::encode_u32_array(list),
        );
    }
}

fn resolve_uid(inner: &Inner, uid: &str) -> Option<ObjectId> {
    let wanted = marshal::encode_string(uid);
    inner.objects.iter().find_map(|(handle, state)| {
        let stored = state
            .properties
            .get(&PropertyAddress::global(selectors::DEVICE_UID))?;
        (*stored == wanted).then_some(*handle)
    })
}

fn build_object(handle: ObjectId, device: &SimulatedDevice) -> ObjectState {
    let mut state = ObjectState {
        db_range: device.db_range,
        ..ObjectState::default()
    };

    let global = |selector| PropertyAddress::global(selector);
    state.put(global(selectors::NAME), marshal::encode_string(&device.name), false);
    state.put(
        global(selectors::DEVICE_UID),
        marshal::encode_string(&device.uid),
        false,
    );
    state.put(
        global(selectors::MODEL_UID),
        marshal::encode_string(&device.model_uid),
        false,
    );
    state.put(
        global(selectors::MANUFACTURER),
        marshal::encode_string(&device.manufacturer),
        false,
    );
    state.put(
        global(selectors::TRANSPORT_TYPE),
        marshal::encode_u32(device.transport),
        false,
    );
    state.put(
        global(selectors::IS_HIDDEN),
        marshal::encode_u32(device.hidden as u32),
        false,
    );
    state.put(global(selectors::DEVICE_IS_ALIVE), marshal::encode_u32(1), false);
    state.put(global(selectors::DEVICE_IS_RUNNING), marshal::encode_u32(0), false);
    state.put(
        global(selectors::DEVICE_IS_RUNNING_SOMEWHERE),
        marshal::encode_u32(0),
        false,
    );
    state.put(
        global(selectors::RELATED_DEVICES),
        marshal::encode_u32_array(&[handle]),
        false,
    );
    state.put(
        global(selectors::NOMINAL_SAMPLE_RATE),
        marshal::encode_f64(device.nominal_rate),
        device.rate_settable,
    );
    state.put(
        global(selectors::ACTUAL_SAMPLE_RATE),
        marshal::encode_f64(device.nominal_rate),
        false,
    );
    state.put(
        global(selectors::AVAILABLE_NOMINAL_SAMPLE_RATES),
        marshal::encode_rate_ranges(&device.rate_ranges),
        false,
    );
    state.put(global(selectors::HOG_MODE), marshal::encode_i32(-1), true);

    for (id, name) in device.clock_sources.iter().enumerate() {
        state.clock_names.insert(id as u32 + 1, name.clone());
    }

    let directions = [
        (SCOPE_INPUT, device.input_channels, device.latency.0, device.safety_offset.0),
        (SCOPE_OUTPUT, device.output_channels, device.latency.1, device.safety_offset.1),
    ];
    for (scope, channels, latency, safety) in directions {
        if channels == 0 {
            continue;
        }
        state.put(
            PropertyAddress::new(selectors::CHANNEL_LAYOUT, scope, ELEMENT_MASTER),
            marshal::encode_u32(channels),
            false,
        );
        state.put(
            PropertyAddress::new(selectors::LATENCY, scope, ELEMENT_MASTER),
            marshal::encode_u32(latency),
            false,
        );
        state.put(
            PropertyAddress::new(selectors::SAFETY_OFFSET, scope, ELEMENT_MASTER),
            marshal::encode_u32(safety),
            false,
        );
        if channels >= 2 {
            state.put(
                PropertyAddress::new(selectors::PREFERRED_CHANNELS_FOR_STEREO, scope, ELEMENT_MASTER),
                marshal::encode_u32_array(&[1, 2]),
                false,
            );
        }
        for (index, name) in device.channel_names.iter().enumerate() {
            let element = index as u32 + 1;
            if element <= channels {
                state.put(
                    PropertyAddress::new(selectors::ELEMENT_NAME, scope, element),
                    marshal::encode_string(name),
                    false,
                );
            }
        }
        // Master control plus one control per numbered channel.
        for element in 0..=channels {
            state.put(
                PropertyAddress::new(selectors::VOLUME_SCALAR, scope, element),
                marshal::encode_f32(device.initial_volume),
                device.volume_settable,
            );
            if device.mute_supported {
                state.put(
                    PropertyAddress::new(selectors::MUTE, scope, element),
                    marshal::encode_u32(0),
                    true,
                );
            }
            if scope == SCOPE_INPUT {
                state.put(
                    PropertyAddress::new(selectors::PLAY_THRU, scope, element),
                    marshal::encode_u32(0),
                    true,
                );
            }
        }
        if !device.clock_sources.is_empty() {
            let ids: Vec<u32> = (1..=device.clock_sources.len() as u32).collect();
            state.put(
                PropertyAddress::new(selectors::CLOCK_SOURCE, scope, ELEMENT_MASTER),
                marshal::encode_u32(1),
                true,
            );
            state.put(
                PropertyAddress::new(selectors::CLOCK_SOURCES, scope, ELEMENT_MASTER),
                marshal::encode_u32_array(&ids),
                false,
            );
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn install_raises_device_list_change() {
        let store = SimulatedStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_listener = hits.clone();
        store
            .add_listener(
                SYSTEM_OBJECT,
                selectors::DEVICE_LIST,
                Arc::new(move |_| {
                    hits_in_listener.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.install(SimulatedDevice::new("uid:a", "Device A"));
        store.flush();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_is_never_invoked_again() {
        let store = SimulatedStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_listener = hits.clone();
        store
            .add_listener(
                SYSTEM_OBJECT,
                selectors::DEVICE_LIST,
                Arc::new(move |_| {
                    hits_in_listener.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.install(SimulatedDevice::new("uid:a", "Device A"));
        store.remove_listener(SYSTEM_OBJECT, selectors::DEVICE_LIST).unwrap();
        let seen = hits.load(Ordering::SeqCst);

        store.install(SimulatedDevice::new("uid:b", "Device B"));
        store.flush();
        assert_eq!(hits.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn unknown_object_fails_closed() {
        let store = SimulatedStore::new();
        let mut buf = [0u8; 4];
        let err = store
            .read(99, PropertyAddress::global(selectors::NAME), &mut buf)
            .unwrap_err();
        assert_eq!(err, ControlError::InvalidObjectReference(99));
    }

    #[test]
    fn uid_resolution_goes_through_the_translation_frame() {
        let store = SimulatedStore::new();
        let handle = store.install(SimulatedDevice::new("uid:a", "Device A"));

        let input = marshal::encode_string("uid:a");
        let mut output = vec![0u8; 4];
        let frame = ValueTranslation::new(&input, &mut output);
        let mut data = frame.as_bytes().to_vec();
        store
            .read(
                SYSTEM_OBJECT,
                PropertyAddress::global(selectors::DEVICE_FOR_UID),
                &mut data,
            )
            .unwrap();
        assert_eq!(marshal::decode_u32(&output).unwrap(), handle);
    }

    #[test]
    fn hog_write_by_second_claimant_is_denied() {
        let store = SimulatedStore::new();
        let handle = store.install(SimulatedDevice::new("uid:a", "Device A"));
        let address = PropertyAddress::global(selectors::HOG_MODE);

        store.write(handle, address, &marshal::encode_i32(100)).unwrap();
        let err = store
            .write(handle, address, &marshal::encode_i32(200))
            .unwrap_err();
        assert_eq!(err, ControlError::PermissionDenied { holder: 100 });

        store.write(handle, address, &marshal::encode_i32(-1)).unwrap();
        store.write(handle, address, &marshal::encode_i32(200)).unwrap();
    }
}
