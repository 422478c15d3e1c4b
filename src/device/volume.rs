//! Channel- and direction-qualified volume, mute, and play-through control.
//!
//! Element zero is the master/aggregate control; numbered elements are
//! individual channels. Scalar↔decibel conversion goes through the device's
//! own curve, never a fixed formula.

use serde::{Deserialize, Serialize};

use super::AudioDevice;
use crate::error::Result;
use crate::events::Direction;
use crate::substrate::{selectors, ELEMENT_MASTER};

/// Snapshot of the volume-related controls of one `(channel, direction)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub has_volume: bool,
    pub volume: Option<f32>,
    pub decibels: Option<f32>,
    pub can_set_volume: bool,
    pub has_mute: bool,
    pub is_muted: bool,
    pub can_mute: bool,
    pub can_play_thru: bool,
    pub is_play_thru_set: bool,
}

impl AudioDevice {
    /// Gathers the volume, mute, and play-through state for a channel and
    /// direction. `None` when the pair exposes none of the three controls.
    pub fn volume_info(&self, channel: u32, direction: Direction) -> Option<VolumeInfo> {
        let mut info = VolumeInfo::default();
        let mut any = false;

        let volume_addr = self.address(selectors::VOLUME_SCALAR, channel, direction);
        if self.bridge().has_property(self.handle(), volume_addr) {
            if let Ok(settable) = self.bridge().is_settable(self.handle(), volume_addr) {
                info.has_volume = true;
                info.can_set_volume = settable;
                if let Ok(volume) = self.bridge().get_f32(self.handle(), volume_addr) {
                    info.volume = Some(volume);
                    any = true;
                }
                info.decibels = self
                    .bridge()
                    .get_f32(
                        self.handle(),
                        self.address(selectors::VOLUME_DECIBELS, channel, direction),
                    )
                    .ok();
            }
        }

        let mute_addr = self.address(selectors::MUTE, channel, direction);
        if self.bridge().has_property(self.handle(), mute_addr) {
            if let Ok(settable) = self.bridge().is_settable(self.handle(), mute_addr) {
                info.has_mute = true;
                info.can_mute = settable;
                if let Ok(muted) = self.bridge().get_bool(self.handle(), mute_addr) {
                    info.is_muted = muted;
                    any = true;
                }
            }
        }

        let thru_addr = self.address(selectors::PLAY_THRU, channel, direction);
        if self.bridge().has_property(self.handle(), thru_addr) {
            if let Ok(settable) = self.bridge().is_settable(self.handle(), thru_addr) {
                info.can_play_thru = settable;
                if let Ok(set) = self.bridge().get_bool(self.handle(), thru_addr) {
                    info.is_play_thru_set = set;
                    any = true;
                }
            }
        }

        any.then_some(info)
    }

    /// Scalar volume (0.0–1.0) of a channel.
    pub fn volume(&self, channel: u32, direction: Direction) -> Result<f32> {
        self.bridge().get_f32(
            self.handle(),
            self.address(selectors::VOLUME_SCALAR, channel, direction),
        )
    }

    /// Volume of a channel in decibels, per the device's curve.
    pub fn volume_in_decibels(&self, channel: u32, direction: Direction) -> Result<f32> {
        self.bridge().get_f32(
            self.handle(),
            self.address(selectors::VOLUME_DECIBELS, channel, direction),
        )
    }

    pub fn set_volume(&self, volume: f32, channel: u32, direction: Direction) -> Result<()> {
        self.bridge().set_f32(
            self.handle(),
            self.address(selectors::VOLUME_SCALAR, channel, direction),
            volume,
        )
    }

    pub fn is_muted(&self, channel: u32, direction: Direction) -> Result<bool> {
        self.bridge().get_bool(
            self.handle(),
            self.address(selectors::MUTE, channel, direction),
        )
    }

    pub fn set_mute(&self, mute: bool, channel: u32, direction: Direction) -> Result<()> {
        self.bridge().set_bool(
            self.handle(),
            self.address(selectors::MUTE, channel, direction),
            mute,
        )
    }

    pub fn can_mute(&self, channel: u32, direction: Direction) -> bool {
        self.volume_info(channel, direction)
            .map(|info| info.can_mute)
            .unwrap_or(false)
    }

    pub fn can_set_volume(&self, channel: u32, direction: Direction) -> bool {
        self.volume_info(channel, direction)
            .map(|info| info.can_set_volume)
            .unwrap_or(false)
    }

    /// Converts a scalar volume to decibels through the device-reported
    /// curve for the channel.
    pub fn scalar_to_decibels(&self, volume: f32, channel: u32, direction: Direction) -> Result<f32> {
        self.bridge().convert_f32(
            self.handle(),
            self.address(selectors::VOLUME_SCALAR_TO_DECIBELS, channel, direction),
            volume,
        )
    }

    /// Converts decibels back to a scalar volume through the device curve.
    pub fn decibels_to_scalar(&self, decibels: f32, channel: u32, direction: Direction) -> Result<f32> {
        self.bridge().convert_f32(
            self.handle(),
            self.address(selectors::VOLUME_DECIBELS_TO_SCALAR, channel, direction),
            decibels,
        )
    }

    /// Master volume for a direction: the master control when present,
    /// otherwise the average of the preferred stereo pair.
    pub fn master_volume(&self, direction: Direction) -> Result<f32> {
        let master = self.address(selectors::VOLUME_SCALAR, ELEMENT_MASTER, direction);
        if self.bridge().has_property(self.handle(), master) {
            return self.bridge().get_f32(self.handle(), master);
        }
        let (left, right) = self.preferred_stereo_channels(direction)?;
        Ok((self.volume(left, direction)? + self.volume(right, direction)?) / 2.0)
    }

    /// Sets the master volume: the master control when settable, otherwise
    /// both channels of the preferred stereo pair.
    pub fn set_master_volume(&self, volume: f32, direction: Direction) -> Result<()> {
        let master = self.address(selectors::VOLUME_SCALAR, ELEMENT_MASTER, direction);
        if self.bridge().has_property(self.handle(), master) {
            return self.bridge().set_f32(self.handle(), master, volume);
        }
        let (left, right) = self.preferred_stereo_channels(direction)?;
        self.set_volume(volume, left, direction)?;
        self.set_volume(volume, right, direction)
    }

    pub fn can_set_master_volume(&self, direction: Direction) -> bool {
        if self.can_set_volume(ELEMENT_MASTER, direction) {
            return true;
        }
        match self.preferred_stereo_channels(direction) {
            Ok((left, right)) => {
                self.can_set_volume(left, direction) && self.can_set_volume(right, direction)
            }
            Err(_) => false,
        }
    }

    pub fn can_mute_master(&self, direction: Direction) -> bool {
        if self.can_mute(ELEMENT_MASTER, direction) {
            return true;
        }
        match self.preferred_stereo_channels(direction) {
            Ok((left, right)) => self.can_mute(left, direction) && self.can_mute(right, direction),
            Err(_) => false,
        }
    }

    pub fn is_master_muted(&self, direction: Direction) -> Result<bool> {
        self.is_muted(ELEMENT_MASTER, direction)
    }

    /// Master volume in decibels, converted through the reference channel:
    /// the master control when settable, else the preferred stereo left.
    pub fn master_volume_in_decibels(&self, direction: Direction) -> Result<f32> {
        let reference = if self.can_set_volume(ELEMENT_MASTER, direction) {
            ELEMENT_MASTER
        } else {
            self.preferred_stereo_channels(direction)?.0
        };
        let volume = self.master_volume(direction)?;
        self.scalar_to_decibels(volume, reference, direction)
    }
}
