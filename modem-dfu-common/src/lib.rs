// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the serial modem DFU: record framing, the producer/consumer
//! channel and the dispatch engine that drives a [`WriteSink`].
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools (thread parking in the channel,
//!   `Vec` based encoding helpers)
//! - `embedded` feature: Cortex-M `wfe`/`sev` wake-up for the blocking channel
//! - `use-log` / `use-defmt` features: select the logging backend

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate alloc;

pub mod channel;
pub mod decoder;
pub mod dispatch;
pub mod ihex;
pub mod record;
pub mod sink;

// Re-export commonly used types
pub use channel::{RecordChannel, RecordReceiver, RecordSender};
pub use decoder::{ChecksumPolicy, DecodeError, DecoderConfig, FieldPolicy, RecordDecoder};
pub use dispatch::{Dispatcher, RecordSource, SessionState, SessionSummary, Step};
pub use ihex::{HexError, ImageError};
pub use record::{EncodeError, Record, RecordKind, SegmentTag};
pub use record::{CHANNEL_CAPACITY, DEFAULT_BAUD_RATE, MAX_PAYLOAD_SIZE, MAX_WIRE_SIZE};
pub use sink::{ApplyError, WriteError, WriteSink};

#[cfg(feature = "use-defmt")]
pub(crate) use defmt as log;

#[cfg(all(feature = "use-log", not(feature = "use-defmt")))]
pub(crate) use ::log;

#[cfg(not(any(feature = "use-log", feature = "use-defmt")))]
pub(crate) mod log {
    macro_rules! debug {
        ( $( $x:tt )* ) => {{}};
    }
    pub(crate) use debug;
    macro_rules! info {
        ( $( $x:tt )* ) => {{}};
    }
    pub(crate) use info;
    macro_rules! warner {
        ( $( $x:tt )* ) => {{}};
    }
    pub(crate) use warner as warn;
    macro_rules! error {
        ( $( $x:tt )* ) => {{}};
    }
    pub(crate) use error;
}
