// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Write sink that stores the received images as files.
//!
//! - `bootloader.bin`: bootloader data, appended in arrival order
//! - `firmware.<n>.bin`: the n-th applied firmware-side image (certificate,
//!   then firmware), with data placed at `address - origin` where `origin` is
//!   the first address written to that image
//!
//! Each apply closes the current firmware-side image, so every segment gets
//! its own origin and its own size bound.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_32_ISO_HDLC};

use modem_dfu_common::{ApplyError, WriteError, WriteSink};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const BOOTLOADER_FILE: &str = "bootloader.bin";

/// Default bound on each image, 8 MiB.
pub const DEFAULT_MAX_IMAGE_SIZE: u64 = 8 * 1024 * 1024;

/// File name of the `index`-th firmware-side image.
pub fn firmware_file(index: usize) -> String {
    format!("firmware.{}.bin", index)
}

fn is_firmware_file(name: &str) -> bool {
    name.starts_with("firmware.") && name.ends_with(".bin")
}

fn create(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

fn file_crc32(path: &Path) -> io::Result<u32> {
    Ok(CRC32.checksum(&fs::read(path)?))
}

/// A firmware-side image closed by an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    pub file: String,
    /// Address that maps to offset 0 of the file.
    pub origin: u32,
    /// Highest offset written, plus one.
    pub len: u64,
}

/// Firmware-side image being written.
struct OpenImage {
    file: File,
    origin: u32,
    len: u64,
    written: bool,
}

pub struct ImageSink {
    dir: PathBuf,
    bootloader: BufWriter<File>,
    current: Option<OpenImage>,
    firmware: Vec<FirmwareImage>,
    max_image_size: u64,
    bootloader_len: u64,
    /// Bootloader data written since the last apply.
    bootloader_pending: bool,
    applies: u32,
}

impl ImageSink {
    /// Create (or truncate) `bootloader.bin` in `dir` and remove firmware
    /// images left by an earlier session.
    pub fn create(dir: &Path, max_image_size: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_firmware_file);
            if stale && path.is_file() {
                fs::remove_file(&path)?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            bootloader: BufWriter::new(create(&dir.join(BOOTLOADER_FILE))?),
            current: None,
            firmware: Vec::new(),
            max_image_size,
            bootloader_len: 0,
            bootloader_pending: false,
            applies: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bootloader_len(&self) -> u64 {
        self.bootloader_len
    }

    /// Firmware-side images applied so far, in order.
    pub fn firmware_images(&self) -> &[FirmwareImage] {
        &self.firmware
    }

    /// Origin of the image currently being written, if any.
    pub fn origin(&self) -> Option<u32> {
        self.current.as_ref().map(|image| image.origin)
    }

    pub fn applies(&self) -> u32 {
        self.applies
    }

    fn open_image(&mut self, origin: u32) -> Result<&mut OpenImage, WriteError> {
        if self.current.is_none() {
            let name = firmware_file(self.firmware.len());
            let file = create(&self.dir.join(&name)).map_err(|e| {
                log::error!("{}: {}", name, e);
                WriteError::Io
            })?;
            log::debug!("{}: origin 0x{:08x}", name, origin);
            self.current = Some(OpenImage {
                file,
                origin,
                len: 0,
                written: false,
            });
        }
        self.current.as_mut().ok_or(WriteError::Io)
    }

    fn report(&self, name: &str) {
        match file_crc32(&self.dir.join(name)) {
            Ok(crc) => log::info!("Applied {} (CRC32: 0x{:08x})", name, crc),
            Err(e) => log::warn!("Applied {}, unable to read it back: {}", name, e),
        }
    }
}

impl WriteSink for ImageSink {
    fn write_bootloader(&mut self, data: &[u8]) -> Result<(), WriteError> {
        let end = self.bootloader_len + data.len() as u64;
        if end > self.max_image_size {
            return Err(WriteError::OutOfRange {
                address: self.bootloader_len as u32,
                len: data.len(),
            });
        }

        self.bootloader.write_all(data).map_err(|e| {
            log::error!("{}: {}", BOOTLOADER_FILE, e);
            WriteError::Io
        })?;
        self.bootloader_len = end;
        self.bootloader_pending = true;
        Ok(())
    }

    fn write_firmware(&mut self, address: u32, data: &[u8]) -> Result<(), WriteError> {
        let max_image_size = self.max_image_size;
        let image = self.open_image(address)?;
        let out_of_range = WriteError::OutOfRange {
            address,
            len: data.len(),
        };

        let Some(offset) = address.checked_sub(image.origin) else {
            return Err(out_of_range);
        };
        let end = offset as u64 + data.len() as u64;
        if end > max_image_size {
            return Err(out_of_range);
        }

        image
            .file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| image.file.write_all(data))
            .map_err(|e| {
                log::error!("Firmware image at offset 0x{:08x}: {}", offset, e);
                WriteError::Io
            })?;
        image.len = image.len.max(end);
        image.written = true;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), ApplyError> {
        let bootloader = std::mem::take(&mut self.bootloader_pending);
        // The next firmware-side write starts a new image
        let image = self.current.take().filter(|image| image.written);
        if !bootloader && image.is_none() {
            return Err(ApplyError::NothingToApply);
        }

        if bootloader {
            self.bootloader
                .flush()
                .and_then(|_| self.bootloader.get_ref().sync_all())
                .map_err(|e| {
                    log::error!("Failed to sync {}: {}", BOOTLOADER_FILE, e);
                    ApplyError::Io
                })?;
        }
        let applied = match image {
            Some(image) => {
                let name = firmware_file(self.firmware.len());
                image.file.sync_all().map_err(|e| {
                    log::error!("Failed to sync {}: {}", name, e);
                    ApplyError::Io
                })?;
                Some(FirmwareImage {
                    file: name,
                    origin: image.origin,
                    len: image.len,
                })
            }
            None => None,
        };
        self.applies += 1;

        if bootloader {
            self.report(BOOTLOADER_FILE);
        }
        if let Some(image) = applied {
            self.report(&image.file);
            self.firmware.push(image);
        }
        Ok(())
    }
}
