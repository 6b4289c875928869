// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};

use modem_dfu_common::DEFAULT_BAUD_RATE;

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "modem-dfu-upload")]
#[command(about = "Firmware upload tool for the serial modem DFU target")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Serial link settings.
#[derive(Args)]
pub struct PortArgs {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long)]
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

/// Where the package images come from.
#[derive(Args, Default)]
pub struct PackageArgs {
    /// Directory holding the firmware packages (zip archives or unpacked directories)
    #[arg(long, value_name = "DIR")]
    pub packages: Option<PathBuf>,

    /// Bootloader image (Intel HEX), overrides the package
    #[arg(long, value_name = "FILE")]
    pub bootloader: Option<PathBuf>,

    /// Certificate segment (Intel HEX), overrides the package
    #[arg(long, value_name = "FILE")]
    pub certificate: Option<PathBuf>,

    /// Firmware segment (Intel HEX), overrides the package
    #[arg(long, value_name = "FILE")]
    pub firmware: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Wait for the target to enter DFU mode and stream a package to it
    Flash {
        #[command(flatten)]
        port: PortArgs,

        #[command(flatten)]
        package: PackageArgs,

        /// Seconds to wait for each target report (UUID, DFU start, post-update UUID)
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Write the tagged record stream of a package to a file
    Encode {
        #[command(flatten)]
        package: PackageArgs,

        /// UUID of the firmware currently on the modem; its package is skipped
        #[arg(long)]
        uuid: Option<String>,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Echo the target console
    Monitor {
        #[command(flatten)]
        port: PortArgs,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Flash {
            port,
            package,
            timeout,
        } => {
            let mut transport = Transport::open(&port.port, port.baud)?;
            commands::flash(&mut transport, &package, Duration::from_secs(timeout))
        }
        Commands::Encode {
            package,
            uuid,
            output,
        } => commands::encode(&package, uuid.as_deref(), &output),
        Commands::Monitor { port } => {
            let transport = Transport::open(&port.port, port.baud)?;
            commands::monitor(&transport)
        }
    }
}
