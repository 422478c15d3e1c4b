use thiserror::Error;

use crate::substrate::{ObjectId, PropertyAddress};

/// Failure kinds surfaced by device control operations.
///
/// Mutators return these rather than panicking; read accessors that keep a
/// cached fallback (device name, capability flags) consume `Unreachable` and
/// serve the cache instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// A session handle or persistent UID no longer resolves to a device.
    #[error("object {0} is not a valid device reference")]
    InvalidObjectReference(ObjectId),

    /// The addressed property does not exist on this object.
    #[error("object {object} has no property {address}")]
    PropertyNotSupported {
        object: ObjectId,
        address: PropertyAddress,
    },

    /// The property exists but cannot be written, or the driver rejected the
    /// write. The two cases are deliberately not distinguished.
    #[error("property {address} on object {object} cannot be set")]
    PropertyNotSettable {
        object: ObjectId,
        address: PropertyAddress,
    },

    /// Marshalled payload size disagrees with the property's native size.
    #[error("payload of {got} bytes where {expected} were expected")]
    SizeMismatch { expected: u32, got: u32 },

    /// The device stopped responding mid-call (disconnected or powered off).
    #[error("object {0} is unreachable")]
    Unreachable(ObjectId),

    /// The requested value is outside what the device reports as supported
    /// (unknown sample rate, unknown clock source name).
    #[error("unsupported value: {0}")]
    ConstraintViolation(String),

    /// Exclusive access is held by another process.
    #[error("exclusive access is held by pid {holder}")]
    PermissionDenied { holder: i32 },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ControlError>;
