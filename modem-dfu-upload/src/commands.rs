// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for the DFU upload flow.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::PackageArgs;
use crate::console::DeviceEvent;
use crate::package::{Image, Package, PackagePaths};
use crate::transport::Transport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn image_crc32(image: &Image) -> u32 {
    let mut digest = CRC32.digest();
    for chunk in image.data() {
        digest.update(chunk);
    }
    digest.finalize()
}

fn print_package(package: &Package) {
    for image in &package.images {
        println!(
            "{:<12} {} ({} records, {} wire bytes, data CRC32: 0x{:08x})",
            format!("{}:", image.segment.name()),
            image.source,
            image.records.len(),
            image.wire_len(),
            image_crc32(image)
        );
    }
}

fn uuid_of(event: &DeviceEvent) -> Option<String> {
    match event {
        DeviceEvent::ModemUuid(uuid) => Some(uuid.clone()),
        _ => None,
    }
}

/// Wait for the target, then stream the selected package to it.
pub fn flash(transport: &mut Transport, args: &PackageArgs, timeout: Duration) -> Result<()> {
    let monitor = transport.spawn_monitor()?;

    // The current UUID is only needed to choose between packages
    let current_uuid = if args.packages.is_some() {
        println!("Waiting for the target on {}...", transport.port_name());
        let uuid = monitor.wait_for("the modem firmware UUID", timeout, uuid_of)?;
        Some(uuid)
    } else {
        None
    };

    let paths = PackagePaths::resolve(args, current_uuid.as_deref())?;
    if let Some(name) = &paths.package {
        println!("Flashing fw: {}", name.display());
    }
    let package = Package::load(&paths)?;
    print_package(&package);
    println!();

    monitor.wait_for("DFU start", timeout, |event| {
        (*event == DeviceEvent::DfuStart).then_some(())
    })?;

    let total = package.wire_len() as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] {msg:<12} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let started = Instant::now();
    let mut sent = 0u64;
    for image in &package.images {
        pb.set_message(image.segment.name());
        for record in &image.records {
            match transport.send_record(record) {
                Ok(n) => sent += n as u64,
                Err(e) => {
                    pb.abandon();
                    return Err(e).with_context(|| {
                        format!("Streaming {} failed at byte {}", image.segment.name(), sent)
                    });
                }
            }
            pb.set_position(sent);
        }
    }
    transport.flush()?;
    pb.finish_with_message("done");

    println!();
    println!("Flashed in: {:.2?}", started.elapsed());

    // The target reports the new UUID once the modem is back in normal mode
    match monitor.wait_for("the updated firmware UUID", timeout, uuid_of) {
        Ok(uuid) if current_uuid.as_deref() == Some(uuid.as_str()) => {
            log::warn!("Modem still reports the previous firmware UUID {}", uuid);
        }
        Ok(uuid) => println!("Modem now runs firmware {}", uuid),
        Err(e) => log::warn!("{:#}", e),
    }

    monitor.stop();
    Ok(())
}

/// Write the tagged wire stream of a package to a file.
pub fn encode(args: &PackageArgs, current_uuid: Option<&str>, output: &Path) -> Result<()> {
    let paths = PackagePaths::resolve(args, current_uuid)?;
    if let Some(name) = &paths.package {
        println!("Encoding fw: {}", name.display());
    }
    let package = Package::load(&paths)?;
    print_package(&package);

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    let mut digest = CRC32.digest();
    let mut written = 0usize;

    for record in package.records() {
        let wire = record.to_wire()?;
        digest.update(&wire);
        out.write_all(&wire)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        written += wire.len();
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!();
    println!(
        "Wrote {} ({} bytes, CRC32: 0x{:08x})",
        output.display(),
        written,
        digest.finalize()
    );

    Ok(())
}

/// Echo the target console until the link goes away.
pub fn monitor(transport: &Transport) -> Result<()> {
    println!("Monitoring {} (Ctrl-C to quit)", transport.port_name());
    let monitor = transport.spawn_monitor()?;
    monitor.wait_disconnected();
    monitor.stop();
    Ok(())
}
