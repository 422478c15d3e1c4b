//! Clock source selection.
//!
//! Sources are addressed by name at the API surface; the numeric ids the
//! substrate uses stay internal and are resolved through the device's
//! id-to-name translation property.

use super::AudioDevice;
use crate::error::{ControlError, Result};
use crate::events::Direction;
use crate::substrate::selectors;

impl AudioDevice {
    /// The active clock source's name for a channel and direction.
    pub fn clock_source(&self, channel: u32, direction: Direction) -> Result<String> {
        let id = self.bridge().get_u32(
            self.handle(),
            self.address(selectors::CLOCK_SOURCE, channel, direction),
        )?;
        self.clock_source_name(id, channel, direction)
    }

    /// Names of every clock source selectable for a channel and direction.
    pub fn clock_sources(&self, channel: u32, direction: Direction) -> Result<Vec<String>> {
        let ids = self.bridge().get_u32_array(
            self.handle(),
            self.address(selectors::CLOCK_SOURCES, channel, direction),
        )?;
        Ok(ids
            .into_iter()
            .map(|id| {
                self.clock_source_name(id, channel, direction)
                    .unwrap_or_else(|_| format!("Clock source {id}"))
            })
            .collect())
    }

    /// Selects a clock source by name. Names absent from `clock_sources`
    /// fail with `ConstraintViolation` without touching the device.
    pub fn set_clock_source(&self, name: &str, channel: u32, direction: Direction) -> Result<()> {
        let ids = self.bridge().get_u32_array(
            self.handle(),
            self.address(selectors::CLOCK_SOURCES, channel, direction),
        )?;
        let id = ids
            .into_iter()
            .find(|id| {
                self.clock_source_name(*id, channel, direction)
                    .map(|n| n == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                ControlError::ConstraintViolation(format!(
                    "clock source {name:?} is not offered by this device"
                ))
            })?;
        self.bridge().set_u32(
            self.handle(),
            self.address(selectors::CLOCK_SOURCE, channel, direction),
            id,
        )
    }

    fn clock_source_name(&self, id: u32, channel: u32, direction: Direction) -> Result<String> {
        self.bridge().translate_u32_to_string(
            self.handle(),
            self.address(selectors::CLOCK_SOURCE_NAME_FOR_ID, channel, direction),
            id,
        )
    }
}
