// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Modem lifecycle control.
//!
//! The DFU session needs the modem shut down and re-initialised in full-DFU
//! mode before records arrive, then brought back to normal mode once the
//! firmware segment has been applied.

use std::io::Write;

use thiserror::Error;

/// Modem library init mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemMode {
    Normal,
    FullDfu,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModemError {
    #[error("init in {mode:?} mode failed with error {code}")]
    Init { mode: ModemMode, code: i32 },
    #[error("shutdown failed with error {0}")]
    Shutdown(i32),
    #[error("modem is not initialised")]
    NotInitialised,
}

/// Control over the modem core.
pub trait ModemControl {
    fn init(&mut self, mode: ModemMode) -> Result<(), ModemError>;

    fn shutdown(&mut self) -> Result<(), ModemError>;

    fn firmware_version(&self) -> Result<String, ModemError>;

    fn firmware_uuid(&self) -> Result<String, ModemError>;
}

/// Firmware identity reported by the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareId {
    pub version: String,
    pub uuid: String,
}

/// In-process modem: reports a fixed firmware identity and tracks its mode.
///
/// A staged identity replaces the current one at the next normal-mode init,
/// the way a real modem boots into freshly applied firmware.
#[derive(Debug)]
pub struct EmulatedModem {
    current: FirmwareId,
    staged: Option<FirmwareId>,
    mode: Option<ModemMode>,
}

impl EmulatedModem {
    pub fn new(current: FirmwareId) -> Self {
        Self {
            current,
            staged: None,
            mode: None,
        }
    }

    /// Firmware the modem will report after the next normal-mode init.
    pub fn stage(&mut self, next: FirmwareId) {
        self.staged = Some(next);
    }

    pub fn mode(&self) -> Option<ModemMode> {
        self.mode
    }

    fn initialised(&self) -> Result<(), ModemError> {
        match self.mode {
            Some(ModemMode::Normal) => Ok(()),
            _ => Err(ModemError::NotInitialised),
        }
    }
}

impl ModemControl for EmulatedModem {
    fn init(&mut self, mode: ModemMode) -> Result<(), ModemError> {
        if self.mode.is_some() {
            return Err(ModemError::Init { mode, code: -16 });
        }
        if mode == ModemMode::Normal {
            if let Some(next) = self.staged.take() {
                self.current = next;
            }
        }
        log::debug!("Modem initialised in {:?} mode", mode);
        self.mode = Some(mode);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ModemError> {
        if self.mode.take().is_none() {
            return Err(ModemError::Shutdown(-1));
        }
        log::debug!("Modem shut down");
        Ok(())
    }

    fn firmware_version(&self) -> Result<String, ModemError> {
        self.initialised()?;
        Ok(self.current.version.clone())
    }

    fn firmware_uuid(&self) -> Result<String, ModemError> {
        self.initialised()?;
        Ok(self.current.uuid.clone())
    }
}

/// Print the firmware version and UUID lines the host tool watches for.
pub fn report_firmware<M: ModemControl + ?Sized>(
    modem: &M,
    console: &mut dyn Write,
) -> std::io::Result<()> {
    match modem.firmware_version() {
        Ok(version) => writeln!(console, "Modem FW version: {}", version)?,
        Err(e) => writeln!(console, "Unable to obtain modem FW version: {}", e)?,
    }
    match modem.firmware_uuid() {
        Ok(uuid) => writeln!(console, "Modem FW UUID: {}", uuid)?,
        Err(e) => writeln!(console, "Unable to obtain modem FW UUID: {}", e)?,
    }
    console.flush()
}
