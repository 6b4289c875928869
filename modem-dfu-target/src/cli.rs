// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use modem_dfu_common::{ChecksumPolicy, DecoderConfig, FieldPolicy, DEFAULT_BAUD_RATE};
use modem_dfu_target::sink::DEFAULT_MAX_IMAGE_SIZE;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "modem-dfu-target")]
#[command(about = "Serial modem DFU target: receives firmware records and stores the images")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Serial port to receive records on (e.g., /dev/ttyUSB0)
    #[arg(short, long, required_unless_present = "input", conflicts_with = "input")]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Replay a captured record stream instead of listening on a port
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory receiving bootloader.bin and one firmware.<n>.bin per applied segment
    #[arg(short, long, value_name = "DIR", default_value = "dfu-out")]
    pub output: PathBuf,

    /// Largest accepted image, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: u64,

    /// Reject unsupported record kinds and unknown segments
    #[arg(long)]
    pub strict: bool,

    /// Accept records whose checksum does not match
    #[arg(long)]
    pub no_verify_checksum: bool,

    /// Firmware version the emulated modem reports
    #[arg(long, default_value = "mfw_emulated_1.0.0")]
    pub modem_version: String,

    /// Firmware UUID the emulated modem reports
    #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
    pub modem_uuid: String,

    /// UUID the modem reports after a completed update
    #[arg(long)]
    pub updated_uuid: Option<String>,

    /// Version the modem reports after a completed update (defaults to the current one)
    #[arg(long, requires = "updated_uuid")]
    pub updated_version: Option<String>,
}

impl Cli {
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            fields: if self.strict {
                FieldPolicy::Strict
            } else {
                FieldPolicy::Permissive
            },
            checksum: if self.no_verify_checksum {
                ChecksumPolicy::Ignore
            } else {
                ChecksumPolicy::Verify
            },
        }
    }
}
