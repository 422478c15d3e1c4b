//! Nominal and actual sample rate.

use tracing::warn;

use super::AudioDevice;
use crate::error::{ControlError, Result};
use crate::substrate::{selectors, PropertyAddress};

/// Discrete rates used to expand a `(min, max)` range reported by
/// range-capable drivers (headset interfaces, some virtual drivers).
const KNOWN_RATES: [f64; 16] = [
    6_400.0, 8_000.0, 11_025.0, 12_000.0, 16_000.0, 22_050.0, 24_000.0, 32_000.0, 44_100.0,
    48_000.0, 64_000.0, 88_200.0, 96_000.0, 128_000.0, 176_400.0, 192_000.0,
];

impl AudioDevice {
    /// The rate the clock is actually producing right now.
    pub fn actual_sample_rate(&self) -> Result<f64> {
        self.bridge().get_f64(
            self.handle(),
            PropertyAddress::global(selectors::ACTUAL_SAMPLE_RATE),
        )
    }

    /// The configured nominal rate.
    pub fn nominal_sample_rate(&self) -> Result<f64> {
        self.bridge().get_f64(
            self.handle(),
            PropertyAddress::global(selectors::NOMINAL_SAMPLE_RATE),
        )
    }

    /// Every nominal rate the device supports. Ranges are expanded against
    /// the known discrete rates; a range with endpoints outside that table
    /// contributes nothing.
    pub fn nominal_sample_rates(&self) -> Result<Vec<f64>> {
        let ranges = self.bridge().get_rate_ranges(
            self.handle(),
            PropertyAddress::global(selectors::AVAILABLE_NOMINAL_SAMPLE_RATES),
        )?;

        let mut rates = Vec::new();
        for (lo, hi) in ranges {
            if lo < hi {
                let start = KNOWN_RATES.iter().position(|r| *r == lo);
                let end = KNOWN_RATES.iter().position(|r| *r == hi);
                match (start, end) {
                    (Some(start), Some(end)) => rates.extend_from_slice(&KNOWN_RATES[start..=end]),
                    _ => warn!(lo, hi, "cannot expand sample-rate range with unknown endpoints"),
                }
            } else {
                rates.push(lo);
            }
        }
        Ok(rates)
    }

    /// Sets the nominal rate. Rates the device does not report as supported
    /// fail with `ConstraintViolation` and leave the live rate untouched.
    pub fn set_nominal_sample_rate(&self, rate: f64) -> Result<()> {
        if !self.nominal_sample_rates()?.contains(&rate) {
            return Err(ControlError::ConstraintViolation(format!(
                "sample rate {rate} Hz is not supported by this device"
            )));
        }
        self.bridge().set_f64(
            self.handle(),
            PropertyAddress::global(selectors::NOMINAL_SAMPLE_RATE),
            rate,
        )
    }
}
