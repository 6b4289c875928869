// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte-at-a-time record decoder.
//!
//! The stream carries no delimiters: every field has a fixed width except the
//! payload, whose width is the length byte that opens the record. The decoder
//! is a plain value owned by the receive context. It never blocks and never
//! allocates, so it can be driven straight from a UART interrupt.

use heapless::Vec as HeaplessVec;
use thiserror::Error;

use crate::log;
use crate::record::{Record, RecordKind, SegmentTag, MAX_PAYLOAD_SIZE};

/// Handling of the kind and segment bytes.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPolicy {
    /// Any kind/segment byte is accepted and stored verbatim.
    #[default]
    Permissive,
    /// Kinds other than data, end-of-file and extended address, and unknown
    /// segment tags, reject the record.
    Strict,
}

/// Handling of the trailing checksum byte.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Reject records whose checksum does not match their contents.
    #[default]
    Verify,
    /// Store the checksum without looking at it.
    Ignore,
}

#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderConfig {
    pub fields: FieldPolicy,
    pub checksum: ChecksumPolicy,
}

impl DecoderConfig {
    /// Accept every record as received, checksum included.
    pub const fn permissive() -> Self {
        Self {
            fields: FieldPolicy::Permissive,
            checksum: ChecksumPolicy::Ignore,
        }
    }

    /// Reject unsupported kinds, unknown segments and bad checksums.
    pub const fn strict() -> Self {
        Self {
            fields: FieldPolicy::Strict,
            checksum: ChecksumPolicy::Verify,
        }
    }
}

/// A record was framed correctly but rejected.
///
/// The whole frame has been consumed when this is reported, the decoder is
/// already waiting for the next length byte.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("checksum mismatch: expected 0x{expected:02x}, found 0x{found:02x}")]
    ChecksumMismatch { expected: u8, found: u8 },
    #[error("unsupported record kind {0}")]
    UnsupportedKind(u8),
    #[error("unknown segment tag {0}")]
    UnknownSegment(u8),
}

/// Field the decoder is waiting for.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitLength,
    AwaitAddress,
    AwaitKind,
    AwaitPayload,
    AwaitChecksum,
    AwaitSegment,
}

pub struct RecordDecoder {
    config: DecoderConfig,
    state: DecoderState,
    length: u8,
    address_bytes: [u8; 2],
    address_pos: usize,
    address: u16,
    kind: u8,
    payload: HeaplessVec<u8, MAX_PAYLOAD_SIZE>,
    checksum: u8,
    records: u32,
    errors: u32,
    bytes: u32,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl RecordDecoder {
    pub const fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::AwaitLength,
            length: 0,
            address_bytes: [0; 2],
            address_pos: 0,
            address: 0,
            kind: 0,
            payload: HeaplessVec::new(),
            checksum: 0,
            records: 0,
            errors: 0,
            bytes: 0,
        }
    }

    pub fn config(&self) -> DecoderConfig {
        self.config
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Records emitted so far.
    pub fn records_decoded(&self) -> u32 {
        self.records
    }

    /// Records rejected so far.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn bytes_consumed(&self) -> u32 {
        self.bytes
    }

    /// Drop any partially received record and wait for a length byte.
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitLength;
        self.address_pos = 0;
        self.payload.clear();
    }

    /// Consume one byte, returning the record it completes.
    ///
    /// Rejected records are counted and logged, then skipped.
    pub fn feed(&mut self, byte: u8) -> Option<Record> {
        match self.try_feed(byte) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("record dropped: {:?}", err);
                None
            }
        }
    }

    /// Consume one byte, reporting why a completed record was rejected.
    pub fn try_feed(&mut self, byte: u8) -> Result<Option<Record>, DecodeError> {
        self.bytes = self.bytes.wrapping_add(1);

        match self.state {
            DecoderState::AwaitLength => {
                self.length = byte;
                self.payload.clear();
                self.address_pos = 0;
                self.state = DecoderState::AwaitAddress;
            }
            DecoderState::AwaitAddress => {
                self.address_bytes[self.address_pos] = byte;
                self.address_pos += 1;
                if self.address_pos == self.address_bytes.len() {
                    self.address = u16::from_be_bytes(self.address_bytes);
                    self.state = DecoderState::AwaitKind;
                }
            }
            DecoderState::AwaitKind => {
                self.kind = byte;
                self.state = if self.length == 0 {
                    DecoderState::AwaitChecksum
                } else {
                    DecoderState::AwaitPayload
                };
            }
            DecoderState::AwaitPayload => {
                // length is a u8, the buffer holds MAX_PAYLOAD_SIZE > u8::MAX
                let _ = self.payload.push(byte);
                if self.payload.len() == self.length as usize {
                    self.state = DecoderState::AwaitChecksum;
                }
            }
            DecoderState::AwaitChecksum => {
                self.checksum = byte;
                self.state = DecoderState::AwaitSegment;
            }
            DecoderState::AwaitSegment => {
                self.state = DecoderState::AwaitLength;
                return self.complete(byte).map(Some);
            }
        }

        Ok(None)
    }

    fn complete(&mut self, segment: u8) -> Result<Record, DecodeError> {
        let record = Record {
            address: self.address,
            kind: RecordKind::from_byte(self.kind),
            payload: core::mem::take(&mut self.payload),
            checksum: self.checksum,
            segment: SegmentTag::from_byte(segment),
        };

        match self.validate(&record) {
            Ok(()) => {
                self.records = self.records.wrapping_add(1);
                Ok(record)
            }
            Err(err) => {
                self.errors = self.errors.wrapping_add(1);
                Err(err)
            }
        }
    }

    fn validate(&self, record: &Record) -> Result<(), DecodeError> {
        if self.config.fields == FieldPolicy::Strict {
            if !record.kind.is_supported() {
                return Err(DecodeError::UnsupportedKind(record.kind.to_byte()));
            }
            if !record.segment.is_known() {
                return Err(DecodeError::UnknownSegment(record.segment.to_byte()));
            }
        }

        if self.config.checksum == ChecksumPolicy::Verify && !record.checksum_valid() {
            return Err(DecodeError::ChecksumMismatch {
                expected: record.expected_checksum(),
                found: record.checksum,
            });
        }

        Ok(())
    }
}
