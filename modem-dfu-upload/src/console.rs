// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Recognition of the target's console reports.

const DFU_START: &str = "DFU start";
const UUID_PREFIX: &str = "Modem FW UUID";

/// Console report the upload flow waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The target re-initialised the modem in DFU mode and waits for records.
    DfuStart,
    /// The target reported the UUID of the firmware currently on the modem.
    ModemUuid(String),
    /// The serial link failed or was closed.
    Disconnected,
}

/// Classify one console line.
pub fn parse_line(line: &str) -> Option<DeviceEvent> {
    if line.contains(DFU_START) {
        return Some(DeviceEvent::DfuStart);
    }

    if line.contains(UUID_PREFIX) {
        // The UUID is the last word of the line
        let uuid = line.trim_end().rsplit(' ').next()?;
        if uuid.is_empty() || uuid.ends_with(':') {
            return None;
        }
        return Some(DeviceEvent::ModemUuid(uuid.to_string()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dfu_start() {
        assert_eq!(parse_line("DFU start\r\n"), Some(DeviceEvent::DfuStart));
    }

    #[test]
    fn test_uuid_line() {
        assert_eq!(
            parse_line("Modem FW UUID: 25c95751-efa4-40d4-8b4a-1dcaab81fac9\r\n"),
            Some(DeviceEvent::ModemUuid(
                "25c95751-efa4-40d4-8b4a-1dcaab81fac9".to_string()
            ))
        );
    }

    #[test]
    fn test_uuid_line_without_value() {
        assert_eq!(parse_line("Modem FW UUID:\n"), None);
    }

    #[test]
    fn test_other_lines_ignored() {
        assert_eq!(parse_line("Modem FW version: mfw_nrf9160_1.3.1\n"), None);
        assert_eq!(parse_line(""), None);
    }
}
