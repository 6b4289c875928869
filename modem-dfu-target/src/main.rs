// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! DFU target for the serial modem update.
//!
//! Usage:
//!   modem-dfu-target --port /dev/ttyUSB0 --output out/
//!   modem-dfu-target --input stream.bin --output out/ --updated-uuid <uuid>

mod cli;

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use modem_dfu_target::modem::{EmulatedModem, FirmwareId, ModemControl, ModemMode};
use modem_dfu_target::session::{self, ConsoleSink, Overflow, SessionConfig};
use modem_dfu_target::sink::{ImageSink, BOOTLOADER_FILE};

/// Read timeout of the serial port; bounds the reaction to the end of a session.
const PORT_TIMEOUT_MS: u64 = 100;

type Link = (Box<dyn Read + Send>, Box<dyn Write>, Overflow);

fn open_link(args: &cli::Cli) -> Result<Link> {
    match (&args.port, &args.input) {
        (Some(name), _) => {
            let port = serialport::new(name, args.baud)
                .timeout(Duration::from_millis(PORT_TIMEOUT_MS))
                .open()
                .with_context(|| format!("Failed to open serial port {}", name))?;
            let console = port
                .try_clone()
                .with_context(|| format!("Failed to clone serial port {}", name))?;
            Ok((Box::new(port), Box::new(console), Overflow::Drop))
        }
        (None, Some(path)) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok((Box::new(file), Box::new(io::stdout()), Overflow::Wait))
        }
        (None, None) => bail!("Pass --port or --input"),
    }
}

fn run(args: cli::Cli) -> Result<()> {
    let (input, mut console, overflow) = open_link(&args)?;

    let mut modem = EmulatedModem::new(FirmwareId {
        version: args.modem_version.clone(),
        uuid: args.modem_uuid.clone(),
    });
    modem
        .init(ModemMode::Normal)
        .context("Modem init failed")?;

    let sink = ImageSink::create(&args.output, args.max_image_size)
        .with_context(|| format!("Failed to create images in {}", args.output.display()))?;

    session::enter_dfu(&mut modem, &mut *console).context("Failed to enter DFU mode")?;

    let config = SessionConfig {
        decoder: args.decoder_config(),
        overflow,
    };
    let stop = AtomicBool::new(false);
    let (report, sink) = session::run(input, config, ConsoleSink::new(sink, &mut *console), &stop);
    let sink = sink.into_inner();

    let summary = report.summary;
    log::info!(
        "{} bytes in, {} records dispatched, {} written to {}",
        report.input.bytes,
        summary.records,
        summary.bytes_written,
        sink.dir().display()
    );
    log::info!("{}: {} bytes", BOOTLOADER_FILE, sink.bootloader_len());
    for image in sink.firmware_images() {
        log::info!(
            "{}: {} bytes (origin 0x{:08x})",
            image.file,
            image.len,
            image.origin
        );
    }

    if summary.completed {
        if let Some(uuid) = &args.updated_uuid {
            modem.stage(FirmwareId {
                version: args
                    .updated_version
                    .clone()
                    .unwrap_or_else(|| args.modem_version.clone()),
                uuid: uuid.clone(),
            });
        }
    }

    session::leave_dfu(&mut modem, &mut *console).context("Failed to leave DFU mode")?;

    if !summary.completed {
        bail!("DFU session ended before the firmware segment was applied");
    }
    if summary.write_failures > 0 || summary.apply_failures > 0 {
        bail!(
            "DFU session completed with {} write and {} apply failures",
            summary.write_failures,
            summary.apply_failures
        );
    }
    Ok(())
}

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

    run(args)
}
