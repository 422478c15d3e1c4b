//! Byte-level payload marshalling for property values.
//!
//! The substrate speaks native-endian bytes; everything typed goes through
//! the helpers here so that size checks live in exactly one place.

use std::ffi::c_void;
use std::mem;

use byteorder::{ByteOrder, NativeEndian};

use crate::error::{ControlError, Result};

/// Identity-resolution call frame, laid out exactly as the host ABI expects.
///
/// The host reads four fields at fixed offsets: input pointer, declared input
/// size, output pointer, declared output size. Rust's default struct layout
/// is free to reorder fields, which silently corrupts this exchange, so the
/// layout is pinned with `repr(C)` and the size is asserted below.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ValueTranslation {
    pub input_data: *const c_void,
    pub input_size: u32,
    pub output_data: *mut c_void,
    pub output_size: u32,
}

impl ValueTranslation {
    pub fn new(input: &[u8], output: &mut [u8]) -> Self {
        Self {
            input_data: input.as_ptr() as *const c_void,
            input_size: input.len() as u32,
            output_data: output.as_mut_ptr() as *mut c_void,
            output_size: output.len() as u32,
        }
    }

    /// The frame as raw bytes, suitable for a translation-selector read.
    pub fn as_bytes(&self) -> &[u8] {
        // Safe: the struct is repr(C), fully initialized, and the view does
        // not outlive `self`.
        unsafe {
            std::slice::from_raw_parts(
                self as *const ValueTranslation as *const u8,
                mem::size_of::<ValueTranslation>(),
            )
        }
    }

    /// Reinterprets a translation frame received as raw bytes.
    ///
    /// Fails with `SizeMismatch` when the payload is not exactly one frame —
    /// the classic symptom of a caller marshalling a differently-packed
    /// struct.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let expected = mem::size_of::<ValueTranslation>() as u32;
        if data.len() as u32 != expected {
            return Err(ControlError::SizeMismatch {
                expected,
                got: data.len() as u32,
            });
        }
        // Safe: size was checked and repr(C) fixes the field offsets.
        Ok(unsafe { std::ptr::read_unaligned(data.as_ptr() as *const ValueTranslation) })
    }

    /// View of the input payload described by the frame.
    ///
    /// # Safety
    /// The frame must have been built by `new` over buffers that are still
    /// live, which the synchronous property-call discipline guarantees.
    pub unsafe fn input(&self) -> &[u8] {
        std::slice::from_raw_parts(self.input_data as *const u8, self.input_size as usize)
    }

    /// Mutable view of the output buffer described by the frame.
    ///
    /// # Safety
    /// Same contract as `input`.
    pub unsafe fn output(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.output_data as *mut u8, self.output_size as usize)
    }
}

fn check_size(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ControlError::SizeMismatch {
            expected: expected as u32,
            got: got as u32,
        });
    }
    Ok(())
}

pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    NativeEndian::write_u32(&mut buf, value);
    buf
}

pub fn decode_u32(data: &[u8]) -> Result<u32> {
    check_size(4, data.len())?;
    Ok(NativeEndian::read_u32(data))
}

pub fn encode_i32(value: i32) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    NativeEndian::write_i32(&mut buf, value);
    buf
}

pub fn decode_i32(data: &[u8]) -> Result<i32> {
    check_size(4, data.len())?;
    Ok(NativeEndian::read_i32(data))
}

pub fn encode_f32(value: f32) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    NativeEndian::write_f32(&mut buf, value);
    buf
}

pub fn decode_f32(data: &[u8]) -> Result<f32> {
    check_size(4, data.len())?;
    Ok(NativeEndian::read_f32(data))
}

pub fn encode_f64(value: f64) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    NativeEndian::write_f64(&mut buf, value);
    buf
}

pub fn decode_f64(data: &[u8]) -> Result<f64> {
    check_size(8, data.len())?;
    Ok(NativeEndian::read_f64(data))
}

pub fn encode_u32_array(values: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; values.len() * 4];
    for (chunk, value) in buf.chunks_exact_mut(4).zip(values) {
        NativeEndian::write_u32(chunk, *value);
    }
    buf
}

pub fn decode_u32_array(data: &[u8]) -> Result<Vec<u32>> {
    if data.len() % 4 != 0 {
        return Err(ControlError::SizeMismatch {
            expected: (data.len() as u32 / 4 + 1) * 4,
            got: data.len() as u32,
        });
    }
    Ok(data.chunks_exact(4).map(NativeEndian::read_u32).collect())
}

/// A closed range of sample rates, `(minimum, maximum)` in hertz. Discrete
/// rates are reported with minimum == maximum.
pub type RateRange = (f64, f64);

pub fn encode_rate_ranges(ranges: &[RateRange]) -> Vec<u8> {
    let mut buf = vec![0u8; ranges.len() * 16];
    for (chunk, (lo, hi)) in buf.chunks_exact_mut(16).zip(ranges) {
        NativeEndian::write_f64(&mut chunk[..8], *lo);
        NativeEndian::write_f64(&mut chunk[8..], *hi);
    }
    buf
}

pub fn decode_rate_ranges(data: &[u8]) -> Result<Vec<RateRange>> {
    if data.len() % 16 != 0 {
        return Err(ControlError::SizeMismatch {
            expected: (data.len() as u32 / 16 + 1) * 16,
            got: data.len() as u32,
        });
    }
    Ok(data
        .chunks_exact(16)
        .map(|chunk| {
            (
                NativeEndian::read_f64(&chunk[..8]),
                NativeEndian::read_f64(&chunk[8..]),
            )
        })
        .collect())
}

pub fn encode_string(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn decode_string(data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|e| ControlError::SizeMismatch {
        expected: data.len() as u32,
        got: e.utf8_error().valid_up_to() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_frame_round_trips_through_bytes() {
        let input = encode_string("AppleUSBAudioEngine:0");
        let mut output = vec![0u8; 4];
        let frame = ValueTranslation::new(&input, &mut output);

        let parsed = ValueTranslation::from_bytes(frame.as_bytes()).unwrap();
        assert_eq!(parsed.input_size, input.len() as u32);
        assert_eq!(parsed.output_size, 4);
        assert_eq!(unsafe { parsed.input() }, &input[..]);
    }

    #[test]
    fn translation_frame_rejects_foreign_layout() {
        // A 12-byte blob is what a naively packed frame on a 32-bit layout
        // would produce; it must be rejected, not reinterpreted.
        let err = ValueTranslation::from_bytes(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, ControlError::SizeMismatch { .. }));
    }

    #[test]
    fn scalar_round_trips() {
        assert_eq!(decode_u32(&encode_u32(48_000)).unwrap(), 48_000);
        assert_eq!(decode_i32(&encode_i32(-1)).unwrap(), -1);
        assert_eq!(decode_f32(&encode_f32(0.75)).unwrap(), 0.75);
        assert_eq!(decode_f64(&encode_f64(44_100.0)).unwrap(), 44_100.0);
    }

    #[test]
    fn short_payload_is_a_size_mismatch() {
        let err = decode_f64(&[0u8; 4]).unwrap_err();
        assert_eq!(
            err,
            ControlError::SizeMismatch {
                expected: 8,
                got: 4
            }
        );
    }

    #[test]
    fn rate_ranges_round_trip() {
        let ranges = vec![(44_100.0, 44_100.0), (8_000.0, 48_000.0)];
        let decoded = decode_rate_ranges(&encode_rate_ranges(&ranges)).unwrap();
        assert_eq!(decoded, ranges);
    }
}
