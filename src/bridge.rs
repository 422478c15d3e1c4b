//! Typed synchronous property access over the raw byte substrate.
//!
//! Calls block on driver IPC; never invoke them from a delivered-notification
//! callback or a real-time render path. Notification workers re-read through
//! a blocking worker context instead.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ControlError, Result};
use crate::substrate::marshal::{self, RateRange, ValueTranslation};
use crate::substrate::{ObjectId, PropertyAddress, PropertyStore, UNKNOWN_OBJECT};

/// Upper bound for string payloads returned through translation calls.
const TRANSLATED_STRING_CAPACITY: usize = 256;

/// Typed facade over a `PropertyStore`.
#[derive(Clone)]
pub struct PropertyBridge {
    store: Arc<dyn PropertyStore>,
}

impl PropertyBridge {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }

    pub fn has_property(&self, object: ObjectId, address: PropertyAddress) -> bool {
        self.store.has_property(object, address)
    }

    pub fn is_settable(&self, object: ObjectId, address: PropertyAddress) -> Result<bool> {
        self.store.is_settable(object, address)
    }

    pub fn property_size(&self, object: ObjectId, address: PropertyAddress) -> Result<u32> {
        self.store.property_size(object, address)
    }

    fn read_exact(&self, object: ObjectId, address: PropertyAddress, len: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        let written = self.store.read(object, address, &mut data)?;
        if written as usize != len {
            return Err(ControlError::SizeMismatch {
                expected: len as u32,
                got: written,
            });
        }
        Ok(data)
    }

    fn read_sized(&self, object: ObjectId, address: PropertyAddress) -> Result<Vec<u8>> {
        let size = self.store.property_size(object, address)? as usize;
        let mut data = vec![0u8; size];
        let written = self.store.read(object, address, &mut data)? as usize;
        data.truncate(written);
        Ok(data)
    }

    pub fn get_u32(&self, object: ObjectId, address: PropertyAddress) -> Result<u32> {
        marshal::decode_u32(&self.read_exact(object, address, 4)?)
    }

    pub fn get_i32(&self, object: ObjectId, address: PropertyAddress) -> Result<i32> {
        marshal::decode_i32(&self.read_exact(object, address, 4)?)
    }

    pub fn get_f32(&self, object: ObjectId, address: PropertyAddress) -> Result<f32> {
        marshal::decode_f32(&self.read_exact(object, address, 4)?)
    }

    pub fn get_f64(&self, object: ObjectId, address: PropertyAddress) -> Result<f64> {
        marshal::decode_f64(&self.read_exact(object, address, 8)?)
    }

    pub fn get_bool(&self, object: ObjectId, address: PropertyAddress) -> Result<bool> {
        Ok(self.get_u32(object, address)? != 0)
    }

    pub fn get_string(&self, object: ObjectId, address: PropertyAddress) -> Result<String> {
        marshal::decode_string(&self.read_sized(object, address)?)
    }

    pub fn get_u32_array(&self, object: ObjectId, address: PropertyAddress) -> Result<Vec<u32>> {
        marshal::decode_u32_array(&self.read_sized(object, address)?)
    }

    pub fn get_rate_ranges(&self, object: ObjectId, address: PropertyAddress) -> Result<Vec<RateRange>> {
        marshal::decode_rate_ranges(&self.read_sized(object, address)?)
    }

    pub fn set_u32(&self, object: ObjectId, address: PropertyAddress, value: u32) -> Result<()> {
        self.set_checked(object, address, &marshal::encode_u32(value))
    }

    pub fn set_i32(&self, object: ObjectId, address: PropertyAddress, value: i32) -> Result<()> {
        self.set_checked(object, address, &marshal::encode_i32(value))
    }

    pub fn set_f32(&self, object: ObjectId, address: PropertyAddress, value: f32) -> Result<()> {
        self.set_checked(object, address, &marshal::encode_f32(value))
    }

    pub fn set_f64(&self, object: ObjectId, address: PropertyAddress, value: f64) -> Result<()> {
        self.set_checked(object, address, &marshal::encode_f64(value))
    }

    pub fn set_bool(&self, object: ObjectId, address: PropertyAddress, value: bool) -> Result<()> {
        self.set_u32(object, address, value as u32)
    }

    /// Probes settability before writing; a non-settable report and a driver
    /// write rejection surface as the same error kind.
    fn set_checked(&self, object: ObjectId, address: PropertyAddress, data: &[u8]) -> Result<()> {
        match self.store.is_settable(object, address) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ControlError::PropertyNotSettable { object, address });
            }
            Err(err) => return Err(err),
        }
        let result = self.store.write(object, address, data);
        if let Err(err) = &result {
            debug!(object, %address, %err, "property write failed");
        }
        result
    }

    /// In-out conversion read: the device transforms `input` through the
    /// addressed curve (e.g. scalar volume to decibels) and returns the
    /// transformed value.
    pub fn convert_f32(&self, object: ObjectId, address: PropertyAddress, input: f32) -> Result<f32> {
        let mut data = marshal::encode_f32(input);
        self.store.read(object, address, &mut data)?;
        marshal::decode_f32(&data)
    }

    /// Translation read resolving a persistent UID to a session handle.
    ///
    /// The exchange is marshalled through the fixed-layout
    /// [`ValueTranslation`] frame; a handle of `UNKNOWN_OBJECT` means the UID
    /// no longer resolves, which fails closed.
    pub fn resolve_uid(&self, system_object: ObjectId, address: PropertyAddress, uid: &str) -> Result<ObjectId> {
        let input = marshal::encode_string(uid);
        let mut output = vec![0u8; 4];
        let frame = ValueTranslation::new(&input, &mut output);
        let mut data = frame.as_bytes().to_vec();
        self.store.read(system_object, address, &mut data)?;
        let handle = marshal::decode_u32(&output)?;
        if handle == UNKNOWN_OBJECT {
            return Err(ControlError::InvalidObjectReference(UNKNOWN_OBJECT));
        }
        Ok(handle)
    }

    /// Translation read mapping a numeric id to a human-readable name.
    pub fn translate_u32_to_string(
        &self,
        object: ObjectId,
        address: PropertyAddress,
        id: u32,
    ) -> Result<String> {
        let input = marshal::encode_u32(id);
        let mut output = vec![0u8; TRANSLATED_STRING_CAPACITY];
        let frame = ValueTranslation::new(&input, &mut output);
        let mut data = frame.as_bytes().to_vec();
        let written = self.store.read(object, address, &mut data)? as usize;
        output.truncate(written.min(TRANSLATED_STRING_CAPACITY));
        marshal::decode_string(&output)
    }
}
