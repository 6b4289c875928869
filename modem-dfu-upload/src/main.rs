// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool that streams a modem firmware package to the DFU target.
//!
//! Usage:
//!   modem-dfu-upload flash --port /dev/ttyACM0 --packages fw/
//!   modem-dfu-upload flash --port /dev/ttyACM0 --bootloader bl.ihex --certificate c.ihex --firmware f.ihex
//!   modem-dfu-upload encode --packages fw/ --uuid <current-uuid> --output stream.bin
//!   modem-dfu-upload monitor --port /dev/ttyACM0

mod cli;
mod commands;
mod console;
mod package;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    cli::run(args)
}
