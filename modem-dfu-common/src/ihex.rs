// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX line parsing.
//!
//! Each line `:LLAAAATT<data>CC` of an image becomes one [`Record`] tagged with
//! the segment of the image it came from. The checksum byte of the line is
//! carried over unchanged so the target can verify it.

#[cfg(feature = "std")]
use alloc::vec::Vec;

use heapless::Vec as HeaplessVec;
use thiserror::Error;

use crate::record::{Record, RecordKind, SegmentTag, MAX_PAYLOAD_SIZE};

#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("line does not start with ':'")]
    MissingStartCode,
    #[error("invalid hex digit at column {0}")]
    InvalidDigit(usize),
    #[error("odd number of hex digits")]
    OddLength,
    #[error("line too short")]
    TooShort,
    #[error("line too long")]
    TooLong,
    #[error("length field says {declared} data bytes, line has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: expected 0x{expected:02x}, found 0x{found:02x}")]
    Checksum { expected: u8, found: u8 },
}

// length + address (2) + kind + checksum
const LINE_OVERHEAD: usize = 5;

fn nibble(c: u8, column: usize) -> Result<u8, HexError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(HexError::InvalidDigit(column)),
    }
}

/// Parse one Intel HEX line into a record tagged with `segment`.
///
/// Surrounding whitespace (including the line terminator) is ignored.
pub fn parse_line(line: &str, segment: SegmentTag) -> Result<Record, HexError> {
    let line = line.trim();
    let digits = line
        .strip_prefix(':')
        .ok_or(HexError::MissingStartCode)?
        .as_bytes();

    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }

    let mut bytes: HeaplessVec<u8, { MAX_PAYLOAD_SIZE + LINE_OVERHEAD }> = HeaplessVec::new();
    for (i, pair) in digits.chunks(2).enumerate() {
        // Column 0 is the ':'
        let column = 1 + i * 2;
        let byte = (nibble(pair[0], column)? << 4) | nibble(pair[1], column + 1)?;
        bytes.push(byte).map_err(|_| HexError::TooLong)?;
    }

    if bytes.len() < LINE_OVERHEAD {
        return Err(HexError::TooShort);
    }

    let declared = bytes[0] as usize;
    let actual = bytes.len() - LINE_OVERHEAD;
    if declared != actual {
        return Err(HexError::LengthMismatch { declared, actual });
    }

    let record = Record {
        address: u16::from_be_bytes([bytes[1], bytes[2]]),
        kind: RecordKind::from_byte(bytes[3]),
        payload: HeaplessVec::from_slice(&bytes[4..4 + declared])
            .map_err(|_| HexError::TooShort)?,
        checksum: bytes[4 + declared],
        segment,
    };

    if !record.checksum_valid() {
        return Err(HexError::Checksum {
            expected: record.expected_checksum(),
            found: record.checksum,
        });
    }

    Ok(record)
}

/// Error in a whole image, with the 1-based line number.
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line {line}: {source}")]
pub struct ImageError {
    pub line: usize,
    pub source: HexError,
}

#[cfg(feature = "std")]
/// Parse every non-blank line of an Intel HEX image.
pub fn parse_image(text: &str, segment: SegmentTag) -> Result<Vec<Record>, ImageError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            parse_line(line, segment).map_err(|source| ImageError { line: i + 1, source })
        })
        .collect()
}
