// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update record model shared by the host streaming tool and the DFU target.
//!
//! A record travels on the serial link as:
//!
//! ```text
//! length:u8 | address:u16 (big-endian) | kind:u8 | payload[length] | checksum:u8 | segment:u8
//! ```
//!
//! The first five fields are the fields of an Intel HEX line; the trailing
//! segment byte tags which image of the firmware package the record belongs to.

#[cfg(feature = "std")]
use alloc::vec::Vec;

use heapless::Vec as HeaplessVec;
use thiserror::Error;

// --- Link constants ---

/// Maximum payload carried by a single record.
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Bytes surrounding the payload on the wire: length, address (2), kind, checksum, segment.
pub const FRAME_OVERHEAD: usize = 6;

/// Largest possible encoded record.
pub const MAX_WIRE_SIZE: usize = MAX_PAYLOAD_SIZE + FRAME_OVERHEAD;

/// Number of decoded records that may wait between producer and consumer.
pub const CHANNEL_CAPACITY: usize = 128;

/// Default baud rate of the update link.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// --- Record kind ---

/// Intel HEX record type.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Data,
    EndOfFile,
    /// Unused by the update flow.
    ExtendedSegmentAddress,
    /// Unused by the update flow.
    StartSegmentAddress,
    /// Extended linear address, sets the upper 16 bits of subsequent data addresses.
    ExtendedAddress,
    /// Unused by the update flow.
    StartLinearAddress,
    Unknown(u8),
}

impl RecordKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Data,
            1 => Self::EndOfFile,
            2 => Self::ExtendedSegmentAddress,
            3 => Self::StartSegmentAddress,
            4 => Self::ExtendedAddress,
            5 => Self::StartLinearAddress,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::EndOfFile => 1,
            Self::ExtendedSegmentAddress => 2,
            Self::StartSegmentAddress => 3,
            Self::ExtendedAddress => 4,
            Self::StartLinearAddress => 5,
            Self::Unknown(other) => other,
        }
    }

    /// Kinds the dispatcher acts on.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Data | Self::EndOfFile | Self::ExtendedAddress)
    }
}

// --- Segment tag ---

/// Image of the firmware package a record belongs to.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentTag {
    Bootloader,
    Certificate,
    Firmware,
    Unknown(u8),
}

impl SegmentTag {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Bootloader,
            2 => Self::Certificate,
            3 => Self::Firmware,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Bootloader => 1,
            Self::Certificate => 2,
            Self::Firmware => 3,
            Self::Unknown(other) => other,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bootloader => "bootloader",
            Self::Certificate => "certificate",
            Self::Firmware => "firmware",
            Self::Unknown(_) => "unknown",
        }
    }
}

// --- Record ---

#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("payload of {len} bytes does not fit the length field")]
    PayloadTooLong { len: usize },
}

/// A fully decoded update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub address: u16,
    pub kind: RecordKind,
    pub payload: HeaplessVec<u8, MAX_PAYLOAD_SIZE>,
    pub checksum: u8,
    pub segment: SegmentTag,
}

impl Record {
    /// Build a record, computing the Intel HEX checksum of its fields.
    ///
    /// Returns `None` if `payload` is longer than a one-byte length field can announce.
    pub fn new(kind: RecordKind, address: u16, payload: &[u8], segment: SegmentTag) -> Option<Self> {
        if payload.len() > u8::MAX as usize {
            return None;
        }
        let payload = HeaplessVec::from_slice(payload).ok()?;
        let mut record = Self {
            address,
            kind,
            payload,
            checksum: 0,
            segment,
        };
        record.checksum = record.expected_checksum();
        Some(record)
    }

    /// Data record.
    pub fn data(address: u16, payload: &[u8], segment: SegmentTag) -> Option<Self> {
        Self::new(RecordKind::Data, address, payload, segment)
    }

    /// End-of-file record closing the image of `segment`.
    pub fn end_of_file(segment: SegmentTag) -> Self {
        Self {
            address: 0,
            kind: RecordKind::EndOfFile,
            payload: HeaplessVec::new(),
            checksum: 0xFF,
            segment,
        }
    }

    /// Extended linear address record carrying the upper 16 address bits.
    pub fn extended_address(upper: u16, segment: SegmentTag) -> Self {
        let mut payload = HeaplessVec::new();
        // Capacity is MAX_PAYLOAD_SIZE, two bytes always fit
        let _ = payload.extend_from_slice(&upper.to_be_bytes());
        let mut record = Self {
            address: 0,
            kind: RecordKind::ExtendedAddress,
            payload,
            checksum: 0,
            segment,
        };
        record.checksum = record.expected_checksum();
        record
    }

    /// Number of payload bytes, the `length` field on the wire.
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Intel HEX checksum of length, address, kind and payload
    /// (two's complement of the byte sum).
    pub fn expected_checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let sum = self
            .payload
            .iter()
            .fold(
                self.length()
                    .wrapping_add(hi)
                    .wrapping_add(lo)
                    .wrapping_add(self.kind.to_byte()),
                |acc, &b| acc.wrapping_add(b),
            );
        sum.wrapping_neg()
    }

    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.expected_checksum()
    }

    /// Encoded size on the wire.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Encode the record into `buf`, returning the number of bytes written.
    ///
    /// Fails if the payload is longer than `u8::MAX`, which a record built
    /// field by field can hold.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if self.payload.len() > u8::MAX as usize {
            return Err(EncodeError::PayloadTooLong {
                len: self.payload.len(),
            });
        }
        let needed = self.wire_len();
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let n = self.payload.len();
        buf[0] = self.length();
        buf[1..3].copy_from_slice(&self.address.to_be_bytes());
        buf[3] = self.kind.to_byte();
        buf[4..4 + n].copy_from_slice(&self.payload);
        buf[4 + n] = self.checksum;
        buf[5 + n] = self.segment.to_byte();

        Ok(needed)
    }

    #[cfg(feature = "std")]
    /// Encode the record into a freshly allocated buffer.
    pub fn to_wire(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = alloc::vec![0u8; self.wire_len()];
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_mapping() {
        for byte in 0..=u8::MAX {
            assert_eq!(RecordKind::from_byte(byte).to_byte(), byte);
        }
        assert_eq!(RecordKind::from_byte(4), RecordKind::ExtendedAddress);
        assert_eq!(RecordKind::from_byte(9), RecordKind::Unknown(9));
    }

    #[test]
    fn test_segment_byte_mapping() {
        assert_eq!(SegmentTag::from_byte(1), SegmentTag::Bootloader);
        assert_eq!(SegmentTag::from_byte(2), SegmentTag::Certificate);
        assert_eq!(SegmentTag::from_byte(3), SegmentTag::Firmware);
        assert_eq!(SegmentTag::from_byte(0), SegmentTag::Unknown(0));
        assert!(!SegmentTag::Unknown(7).is_known());
    }

    #[test]
    fn test_supported_kinds() {
        assert!(RecordKind::Data.is_supported());
        assert!(RecordKind::EndOfFile.is_supported());
        assert!(RecordKind::ExtendedAddress.is_supported());
        assert!(!RecordKind::StartLinearAddress.is_supported());
        assert!(!RecordKind::Unknown(0x42).is_supported());
    }

    #[test]
    fn test_checksum_matches_intel_hex() {
        // :10010000214601360121470136007EFE09D2190140
        let payload = [
            0x21, 0x46, 0x01, 0x36, 0x01, 0x21, 0x47, 0x01, 0x36, 0x00, 0x7E, 0xFE, 0x09, 0xD2,
            0x19, 0x01,
        ];
        let record = Record::data(0x0100, &payload, SegmentTag::Firmware).unwrap();
        assert_eq!(record.checksum, 0x40);
        assert!(record.checksum_valid());
    }

    #[test]
    fn test_end_of_file_checksum() {
        let record = Record::end_of_file(SegmentTag::Firmware);
        assert_eq!(record.checksum, record.expected_checksum());
        assert_eq!(record.length(), 0);
    }

    #[test]
    fn test_extended_address_payload_is_big_endian() {
        let record = Record::extended_address(0x0001, SegmentTag::Firmware);
        assert_eq!(&record.payload[..], &[0x00, 0x01]);
        // :020000040001F9
        assert_eq!(record.checksum, 0xF9);
    }

    #[test]
    fn test_encode_layout() {
        let record = Record::data(0x1234, &[0xAA, 0xBB], SegmentTag::Certificate).unwrap();
        let mut buf = [0u8; MAX_WIRE_SIZE];
        let n = record.encode_into(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(
            &buf[..n],
            &[0x02, 0x12, 0x34, 0x00, 0xAA, 0xBB, record.checksum, 0x02]
        );
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let record = Record::data(0, &[1, 2, 3], SegmentTag::Firmware).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            record.encode_into(&mut buf),
            Err(EncodeError::BufferTooSmall {
                needed: 9,
                available: 4
            })
        );
    }

    #[test]
    fn test_payload_too_large_rejected() {
        let payload = [0u8; MAX_PAYLOAD_SIZE];
        assert!(Record::data(0, &payload, SegmentTag::Firmware).is_none());
        assert!(Record::data(0, &payload[..255], SegmentTag::Firmware).is_some());
    }

    #[test]
    fn test_encode_rejects_overlong_literal_payload() {
        let mut record = Record::data(0, &[0u8; 255], SegmentTag::Firmware).unwrap();
        record.payload.push(0).unwrap();
        let mut buf = [0u8; MAX_WIRE_SIZE];
        assert_eq!(
            record.encode_into(&mut buf),
            Err(EncodeError::PayloadTooLong { len: 256 })
        );
    }
}
