//! Fixed-layout audio buffer blocks for streaming consumers.
//!
//! Allocation and deep copies take heap locks and must not run inside a
//! real-time render callback; size everything up front and reuse.

use serde::{Deserialize, Serialize};

/// The sample layout a buffer list is sized from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
    pub bytes_per_frame: u32,
    /// Interleaved formats pack all channels into one buffer; non-interleaved
    /// formats get one buffer per channel.
    pub interleaved: bool,
}

impl StreamFormat {
    /// Canonical 32-bit float PCM at the given rate and channel count.
    pub fn pcm_f32(sample_rate: f64, channels: u32, interleaved: bool) -> Self {
        let bytes_per_sample = 4;
        Self {
            sample_rate,
            channels_per_frame: channels,
            bits_per_channel: bytes_per_sample * 8,
            bytes_per_frame: if interleaved {
                bytes_per_sample * channels
            } else {
                bytes_per_sample
            },
            interleaved,
        }
    }
}

/// One buffer of a `BufferList`: raw bytes plus the channel count they carry.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: u32,
    pub data: Vec<u8>,
}

/// A block of audio buffers sized from a stream format.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferList {
    buffers: Vec<AudioBuffer>,
}

impl BufferList {
    /// Allocates zeroed buffers for `frames` frames of `format`:
    /// one buffer per channel when non-interleaved, a single buffer
    /// otherwise.
    pub fn allocate(format: &StreamFormat, frames: u32) -> Self {
        let (buffer_count, channels_per_buffer) = if format.interleaved {
            (1, format.channels_per_frame)
        } else {
            (format.channels_per_frame, 1)
        };
        let bytes_per_buffer = (format.bytes_per_frame * frames) as usize;

        let buffers = (0..buffer_count)
            .map(|_| AudioBuffer {
                channels: channels_per_buffer,
                data: vec![0u8; bytes_per_buffer],
            })
            .collect();
        Self { buffers }
    }

    /// Deep copy, buffer contents included.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Number of frames the list holds for `format`.
    pub fn frame_count(&self, format: &StreamFormat) -> u32 {
        let Some(first) = self.buffers.first() else {
            return 0;
        };
        let channels = if format.interleaved {
            first.channels
        } else {
            self.buffers.len() as u32
        };
        let bytes_per_sample = format.bits_per_channel / 8;
        if channels == 0 || bytes_per_sample == 0 {
            return 0;
        }
        first.data.len() as u32 / (bytes_per_sample * channels)
    }

    pub fn buffers(&self) -> &[AudioBuffer] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [AudioBuffer] {
        &mut self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_allocation_uses_one_buffer() {
        let format = StreamFormat::pcm_f32(48_000.0, 2, true);
        let list = BufferList::allocate(&format, 1024);

        assert_eq!(list.buffers().len(), 1);
        assert_eq!(list.buffers()[0].channels, 2);
        assert_eq!(list.buffers()[0].data.len(), 1024 * 8);
        assert_eq!(list.frame_count(&format), 1024);
    }

    #[test]
    fn non_interleaved_allocation_uses_one_buffer_per_channel() {
        let format = StreamFormat::pcm_f32(48_000.0, 4, false);
        let list = BufferList::allocate(&format, 256);

        assert_eq!(list.buffers().len(), 4);
        assert!(list.buffers().iter().all(|b| b.channels == 1));
        assert!(list.buffers().iter().all(|b| b.data.len() == 256 * 4));
        assert_eq!(list.frame_count(&format), 256);
    }

    #[test]
    fn duplicate_copies_contents() {
        let format = StreamFormat::pcm_f32(44_100.0, 1, true);
        let mut list = BufferList::allocate(&format, 8);
        list.buffers_mut()[0].data[0] = 0x7f;

        let copy = list.duplicate();
        assert_eq!(copy, list);

        // Independent storage.
        list.buffers_mut()[0].data[0] = 0;
        assert_ne!(copy.buffers()[0].data[0], list.buffers()[0].data[0]);
    }
}
