// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Dispatch engine: routes decoded records to the write sink.
//!
//! - ExtendedAddress: set the upper 16 bits of the firmware base address
//! - Data: bootloader segment goes to `write_bootloader`, every other segment
//!   to `write_firmware` at `base_address + record.address`
//! - EndOfFile: `apply`; the firmware segment's end-of-file ends the session
//!
//! Sink failures are logged and counted, never fatal.

use crate::log;
use crate::record::{Record, RecordKind, SegmentTag};
use crate::sink::WriteSink;

/// Supplier of records for [`Dispatcher::run`].
pub trait RecordSource {
    /// Next record, blocking if needed. `None` ends the session.
    fn next_record(&mut self) -> Option<Record>;
}

impl<I: Iterator<Item = Record>> RecordSource for I {
    fn next_record(&mut self) -> Option<Record> {
        self.next()
    }
}

/// What the loop does after a record.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Terminate,
}

/// Session state machine states.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No record handled yet.
    Idle,
    /// Records are flowing.
    Receiving,
    /// The firmware end-of-file has been handled.
    Terminated,
}

/// Counters for a dispatch session.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: u32,
    pub bytes_written: u32,
    pub write_failures: u32,
    pub applies: u32,
    pub apply_failures: u32,
    pub ignored: u32,
    /// The session ended on the firmware end-of-file rather than on a closed source.
    pub completed: bool,
}

/// Base address carried by an extended address record.
///
/// Only the first two payload bytes count, read big-endian and moved to the
/// upper half-word. Missing bytes read as zero.
pub fn extended_base_address(payload: &[u8]) -> u32 {
    let hi = payload.first().copied().unwrap_or(0);
    let lo = payload.get(1).copied().unwrap_or(0);
    (u16::from_be_bytes([hi, lo]) as u32) << 16
}

pub struct Dispatcher<S> {
    sink: S,
    base_address: u32,
    state: SessionState,
    summary: SessionSummary,
}

impl<S: WriteSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            base_address: 0,
            state: SessionState::Idle,
            summary: SessionSummary::default(),
        }
    }

    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Pull records from `source` until the firmware end-of-file or until the
    /// source runs dry.
    pub fn run<R: RecordSource + ?Sized>(&mut self, source: &mut R) -> SessionSummary {
        while let Some(record) = source.next_record() {
            if self.handle(&record) == Step::Terminate {
                break;
            }
        }

        log::info!(
            "session ended: {} records, {} bytes, {} write failures, {} applies ({} failed), completed: {}",
            self.summary.records,
            self.summary.bytes_written,
            self.summary.write_failures,
            self.summary.applies,
            self.summary.apply_failures,
            self.summary.completed
        );

        self.summary
    }

    /// Process a single record.
    pub fn handle(&mut self, record: &Record) -> Step {
        if self.state == SessionState::Terminated {
            log::warn!("record after end of session ignored");
            return Step::Terminate;
        }

        self.state = SessionState::Receiving;
        self.summary.records = self.summary.records.wrapping_add(1);

        match record.kind {
            RecordKind::ExtendedAddress => self.handle_extended_address(record),
            RecordKind::Data => self.handle_data(record),
            RecordKind::EndOfFile => self.handle_end_of_file(record),
            other => {
                log::debug!("ignoring record of kind {:?}", other);
                self.summary.ignored = self.summary.ignored.wrapping_add(1);
                Step::Continue
            }
        }
    }

    fn handle_extended_address(&mut self, record: &Record) -> Step {
        self.base_address = extended_base_address(&record.payload);
        log::info!("base address 0x{:08x}", self.base_address);
        Step::Continue
    }

    fn handle_data(&mut self, record: &Record) -> Step {
        let result = if record.segment == SegmentTag::Bootloader {
            self.sink.write_bootloader(&record.payload)
        } else {
            let address = self.base_address.wrapping_add(record.address as u32);
            self.sink.write_firmware(address, &record.payload)
        };

        match result {
            Ok(()) => {
                self.summary.bytes_written = self
                    .summary
                    .bytes_written
                    .wrapping_add(record.payload.len() as u32);
            }
            Err(err) => {
                log::error!(
                    "{:?} write at 0x{:04x} failed: {:?}",
                    record.segment,
                    record.address,
                    err
                );
                self.summary.write_failures = self.summary.write_failures.wrapping_add(1);
            }
        }

        Step::Continue
    }

    fn handle_end_of_file(&mut self, record: &Record) -> Step {
        self.summary.applies = self.summary.applies.wrapping_add(1);
        match self.sink.apply() {
            Ok(()) => log::info!("{:?} apply succeeded", record.segment),
            Err(err) => {
                log::error!("{:?} apply failed: {:?}", record.segment, err);
                self.summary.apply_failures = self.summary.apply_failures.wrapping_add(1);
            }
        }

        if record.segment == SegmentTag::Firmware {
            self.state = SessionState::Terminated;
            self.summary.completed = true;
            Step::Terminate
        } else {
            Step::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_base_address_two_bytes() {
        assert_eq!(extended_base_address(&[0x00, 0x01]), 0x0001_0000);
        assert_eq!(extended_base_address(&[0x12, 0x34]), 0x1234_0000);
    }

    #[test]
    fn test_extended_base_address_short_payload() {
        assert_eq!(extended_base_address(&[]), 0);
        assert_eq!(extended_base_address(&[0xAB]), 0xAB00_0000);
    }

    #[test]
    fn test_extended_base_address_ignores_extra_bytes() {
        assert_eq!(extended_base_address(&[0x00, 0x05, 0xFF, 0xFF]), 0x0005_0000);
    }
}
