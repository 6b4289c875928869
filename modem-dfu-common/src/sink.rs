// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boundary to the component that persists and applies the update.

use thiserror::Error;

#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The device reported an error code.
    #[error("device error {0}")]
    Device(i32),
    #[error("write of {len} bytes at 0x{address:08x} is out of range")]
    OutOfRange { address: u32, len: usize },
    #[error("storage I/O failure")]
    Io,
}

#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The device reported an error code.
    #[error("device error {0}")]
    Device(i32),
    #[error("nothing written since the last apply")]
    NothingToApply,
    #[error("storage I/O failure")]
    Io,
}

/// Destination of decoded update data.
///
/// Calls may take a long time (a full modem update runs for minutes). The
/// dispatcher calls them one at a time from its own context.
pub trait WriteSink {
    /// Write a chunk of the bootloader image. The sink tracks the bootloader
    /// write position itself.
    fn write_bootloader(&mut self, data: &[u8]) -> Result<(), WriteError>;

    /// Write a chunk of the firmware (or certificate) image at an absolute address.
    fn write_firmware(&mut self, address: u32, data: &[u8]) -> Result<(), WriteError>;

    /// Apply what has been written so far.
    fn apply(&mut self) -> Result<(), ApplyError>;
}

impl<S: WriteSink + ?Sized> WriteSink for &mut S {
    fn write_bootloader(&mut self, data: &[u8]) -> Result<(), WriteError> {
        (**self).write_bootloader(data)
    }

    fn write_firmware(&mut self, address: u32, data: &[u8]) -> Result<(), WriteError> {
        (**self).write_firmware(address, data)
    }

    fn apply(&mut self) -> Result<(), ApplyError> {
        (**self).apply()
    }
}
