// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the file-backed image sink.

use std::fs;
use std::path::PathBuf;

use modem_dfu_common::{ApplyError, WriteError, WriteSink};
use modem_dfu_target::sink::{firmware_file, FirmwareImage, ImageSink, BOOTLOADER_FILE};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("modem-dfu-sink-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_bootloader_appended_in_order() {
    let dir = scratch_dir("bl");
    let mut sink = ImageSink::create(&dir, 64).unwrap();

    sink.write_bootloader(&[1, 2]).unwrap();
    sink.write_bootloader(&[3]).unwrap();
    sink.apply().unwrap();

    assert_eq!(sink.bootloader_len(), 3);
    assert_eq!(fs::read(dir.join(BOOTLOADER_FILE)).unwrap(), vec![1, 2, 3]);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_firmware_placed_relative_to_first_address() {
    let dir = scratch_dir("fw");
    let mut sink = ImageSink::create(&dir, 64).unwrap();

    sink.write_firmware(0x0001_0004, &[0xAA]).unwrap();
    sink.write_firmware(0x0001_0000 + 8, &[0xBB, 0xCC]).unwrap();
    assert_eq!(sink.origin(), Some(0x0001_0004));
    sink.apply().unwrap();

    assert_eq!(sink.origin(), None);
    assert_eq!(
        sink.firmware_images(),
        &[FirmwareImage {
            file: firmware_file(0),
            origin: 0x0001_0004,
            len: 6,
        }]
    );
    assert_eq!(
        fs::read(dir.join(firmware_file(0))).unwrap(),
        vec![0xAA, 0, 0, 0, 0xBB, 0xCC]
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_firmware_below_origin_rejected() {
    let dir = scratch_dir("below");
    let mut sink = ImageSink::create(&dir, 64).unwrap();

    sink.write_firmware(0x100, &[1]).unwrap();

    assert_eq!(
        sink.write_firmware(0xFF, &[2]),
        Err(WriteError::OutOfRange {
            address: 0xFF,
            len: 1
        })
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_each_apply_starts_a_new_origin() {
    let dir = scratch_dir("origins");
    let mut sink = ImageSink::create(&dir, 16).unwrap();

    // Second image lies below the first and further away than the size bound
    sink.write_firmware(0x0006_0000, &[0xC0, 0xC1]).unwrap();
    sink.apply().unwrap();
    sink.write_firmware(0x0005_0010, &[0xF0]).unwrap();
    sink.write_firmware(0x0005_0012, &[0xF2]).unwrap();
    sink.apply().unwrap();

    let images = sink.firmware_images();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].origin, 0x0006_0000);
    assert_eq!(images[1].origin, 0x0005_0010);
    assert_eq!(fs::read(dir.join(firmware_file(0))).unwrap(), vec![0xC0, 0xC1]);
    assert_eq!(fs::read(dir.join(firmware_file(1))).unwrap(), vec![0xF0, 0, 0xF2]);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_failed_image_is_not_applied() {
    let dir = scratch_dir("failed");
    let mut sink = ImageSink::create(&dir, 4).unwrap();

    assert!(sink.write_firmware(0x1000, &[0; 8]).is_err());
    assert_eq!(sink.apply(), Err(ApplyError::NothingToApply));
    assert!(sink.firmware_images().is_empty());

    sink.write_firmware(0x2000, &[7]).unwrap();
    sink.apply().unwrap();
    assert_eq!(sink.firmware_images()[0].file, firmware_file(0));
    assert_eq!(sink.firmware_images()[0].origin, 0x2000);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_images_bounded_by_max_size() {
    let dir = scratch_dir("max");
    let mut sink = ImageSink::create(&dir, 4).unwrap();

    sink.write_bootloader(&[0; 4]).unwrap();
    assert!(matches!(
        sink.write_bootloader(&[0]),
        Err(WriteError::OutOfRange { .. })
    ));

    sink.write_firmware(0x2000, &[0; 2]).unwrap();
    assert_eq!(
        sink.write_firmware(0x2003, &[0; 2]),
        Err(WriteError::OutOfRange {
            address: 0x2003,
            len: 2
        })
    );
    sink.apply().unwrap();
    assert_eq!(sink.firmware_images()[0].len, 2);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_apply_without_writes_fails() {
    let dir = scratch_dir("empty");
    let mut sink = ImageSink::create(&dir, 64).unwrap();

    assert_eq!(sink.apply(), Err(ApplyError::NothingToApply));

    sink.write_bootloader(&[1]).unwrap();
    assert_eq!(sink.apply(), Ok(()));
    assert_eq!(sink.apply(), Err(ApplyError::NothingToApply));
    assert_eq!(sink.applies(), 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_create_truncates_previous_images() {
    let dir = scratch_dir("truncate");
    {
        let mut sink = ImageSink::create(&dir, 64).unwrap();
        sink.write_bootloader(&[9; 8]).unwrap();
        sink.write_firmware(0x100, &[9; 8]).unwrap();
        sink.apply().unwrap();
    }
    assert!(dir.join(firmware_file(0)).exists());

    let sink = ImageSink::create(&dir, 64).unwrap();

    assert_eq!(sink.bootloader_len(), 0);
    assert!(fs::read(dir.join(BOOTLOADER_FILE)).unwrap().is_empty());
    assert!(!dir.join(firmware_file(0)).exists());

    fs::remove_dir_all(&dir).unwrap();
}
