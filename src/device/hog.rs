//! Exclusive ("hog") access.
//!
//! The owner is a process id; `-1` means the device is available to all
//! processes. Claiming a device another process holds fails — ownership is
//! never force-stolen.

use super::AudioDevice;
use crate::error::{ControlError, Result};
use crate::substrate::{selectors, PropertyAddress};

const HOG_FREE: i32 = -1;

impl AudioDevice {
    /// The pid holding exclusive access, or `None` when the device is free.
    pub fn hog_mode_pid(&self) -> Result<Option<i32>> {
        let pid = self.bridge().get_i32(
            self.handle(),
            PropertyAddress::global(selectors::HOG_MODE),
        )?;
        Ok((pid != HOG_FREE).then_some(pid))
    }

    /// Claims exclusive access for `pid`. Fails with `PermissionDenied` when
    /// a different process already holds the device; no write is issued in
    /// that case.
    pub fn set_hog_mode_pid(&self, pid: i32) -> Result<()> {
        match self.hog_mode_pid()? {
            Some(holder) if holder != pid => Err(ControlError::PermissionDenied { holder }),
            Some(_) => Ok(()),
            None => self.bridge().set_i32(
                self.handle(),
                PropertyAddress::global(selectors::HOG_MODE),
                pid,
            ),
        }
    }

    /// Claims exclusive access for the calling process.
    pub fn set_hog_mode_to_current_process(&self) -> Result<()> {
        self.set_hog_mode_pid(std::process::id() as i32)
    }

    /// Releases exclusive access held by the calling process. A no-op when
    /// the device is already free; fails with `PermissionDenied` when some
    /// other process is the holder.
    pub fn unset_hog_mode(&self) -> Result<()> {
        self.unset_hog_mode_for(std::process::id() as i32)
    }

    /// Releases exclusive access on behalf of `pid`, for callers that manage
    /// hog ownership for processes they supervise.
    pub fn unset_hog_mode_for(&self, pid: i32) -> Result<()> {
        match self.hog_mode_pid()? {
            None => Ok(()),
            Some(holder) if holder == pid => self.bridge().set_i32(
                self.handle(),
                PropertyAddress::global(selectors::HOG_MODE),
                HOG_FREE,
            ),
            Some(holder) => Err(ControlError::PermissionDenied { holder }),
        }
    }
}
