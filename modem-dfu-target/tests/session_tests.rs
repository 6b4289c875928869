// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! End-to-end tests of a DFU session: wire bytes in, image files out.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use modem_dfu_common::{ApplyError, Record, SegmentTag, WriteError, WriteSink, MAX_WIRE_SIZE};
use modem_dfu_target::modem::{EmulatedModem, FirmwareId, ModemControl, ModemMode};
use modem_dfu_target::session::{self, ConsoleSink, Overflow, SessionConfig};
use modem_dfu_target::sink::{firmware_file, ImageSink, BOOTLOADER_FILE, DEFAULT_MAX_IMAGE_SIZE};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("modem-dfu-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn wire(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; MAX_WIRE_SIZE];
    for record in records {
        let n = record.encode_into(&mut buf).unwrap();
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn data(address: u16, payload: &[u8], segment: SegmentTag) -> Record {
    Record::data(address, payload, segment).unwrap()
}

fn package() -> Vec<Record> {
    vec![
        data(0x0000, &[0xB0, 0xB1], SegmentTag::Bootloader),
        data(0x0002, &[0xB2], SegmentTag::Bootloader),
        Record::end_of_file(SegmentTag::Bootloader),
        Record::extended_address(0x0005, SegmentTag::Certificate),
        data(0x0000, &[0xC0, 0xC1], SegmentTag::Certificate),
        Record::end_of_file(SegmentTag::Certificate),
        Record::extended_address(0x0005, SegmentTag::Firmware),
        data(0x0010, &[0xF0, 0xF1, 0xF2], SegmentTag::Firmware),
        Record::end_of_file(SegmentTag::Firmware),
    ]
}

fn replay() -> SessionConfig {
    SessionConfig {
        overflow: Overflow::Wait,
        ..Default::default()
    }
}

/// Reader that never yields data, like an idle serial port.
struct IdleLink;

impl Read for IdleLink {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(Duration::from_millis(5));
        Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
    }
}

/// Sink that stalls on its first write.
#[derive(Default)]
struct SlowSink {
    writes: u32,
}

impl WriteSink for SlowSink {
    fn write_bootloader(&mut self, _data: &[u8]) -> Result<(), WriteError> {
        Ok(())
    }

    fn write_firmware(&mut self, _address: u32, _data: &[u8]) -> Result<(), WriteError> {
        if self.writes == 0 {
            thread::sleep(Duration::from_millis(200));
        }
        self.writes += 1;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), ApplyError> {
        Ok(())
    }
}

// =============================================================================
// Full session
// =============================================================================

#[test]
fn test_package_written_to_images() {
    let dir = scratch_dir("full");
    let sink = ImageSink::create(&dir, DEFAULT_MAX_IMAGE_SIZE).unwrap();
    let stop = AtomicBool::new(false);

    let (report, sink) = session::run(Cursor::new(wire(&package())), replay(), sink, &stop);

    assert!(report.summary.completed);
    assert_eq!(report.summary.records, 9);
    assert_eq!(report.summary.applies, 3);
    assert_eq!(report.summary.write_failures, 0);
    assert_eq!(report.input.decode_errors, 0);
    assert_eq!(report.input.dropped, 0);
    assert_eq!(sink.applies(), 3);

    assert_eq!(fs::read(dir.join(BOOTLOADER_FILE)).unwrap(), vec![0xB0, 0xB1, 0xB2]);
    let images = sink.firmware_images();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].origin, 0x0005_0000);
    assert_eq!(images[1].origin, 0x0005_0010);
    assert_eq!(fs::read(dir.join(firmware_file(0))).unwrap(), vec![0xC0, 0xC1]);
    assert_eq!(fs::read(dir.join(firmware_file(1))).unwrap(), vec![0xF0, 0xF1, 0xF2]);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_bytes_after_firmware_end_are_not_dispatched() {
    let dir = scratch_dir("trailing");
    let sink = ImageSink::create(&dir, DEFAULT_MAX_IMAGE_SIZE).unwrap();
    let stop = AtomicBool::new(false);
    let mut records = package();
    records.push(data(0x0100, &[0xEE], SegmentTag::Firmware));

    let (report, sink) = session::run(Cursor::new(wire(&records)), replay(), sink, &stop);

    assert!(report.summary.completed);
    assert_eq!(report.summary.records, 9);
    assert_eq!(sink.firmware_images().len(), 2);
    assert_eq!(sink.firmware_images()[1].len, 3);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_corrupted_record_skipped() {
    let dir = scratch_dir("corrupt");
    let sink = ImageSink::create(&dir, DEFAULT_MAX_IMAGE_SIZE).unwrap();
    let stop = AtomicBool::new(false);
    let mut records = package();
    records[1].checksum ^= 0xFF;

    let (report, _sink) = session::run(Cursor::new(wire(&records)), replay(), sink, &stop);

    assert!(report.summary.completed);
    assert_eq!(report.input.decode_errors, 1);
    assert_eq!(fs::read(dir.join(BOOTLOADER_FILE)).unwrap(), vec![0xB0, 0xB1]);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_certificate_above_firmware() {
    let dir = scratch_dir("layout");
    let sink = ImageSink::create(&dir, 0x1000).unwrap();
    let stop = AtomicBool::new(false);
    let records = vec![
        Record::extended_address(0x0006, SegmentTag::Certificate),
        data(0x0000, &[0xC0], SegmentTag::Certificate),
        Record::end_of_file(SegmentTag::Certificate),
        Record::extended_address(0x0005, SegmentTag::Firmware),
        data(0x0000, &[0xF0], SegmentTag::Firmware),
        Record::end_of_file(SegmentTag::Firmware),
    ];

    let (report, sink) = session::run(Cursor::new(wire(&records)), replay(), sink, &stop);

    assert!(report.summary.completed);
    assert_eq!(report.summary.write_failures, 0);
    assert_eq!(report.summary.apply_failures, 0);
    let images = sink.firmware_images();
    assert_eq!(images[0].origin, 0x0006_0000);
    assert_eq!(images[1].origin, 0x0005_0000);
    assert_eq!(fs::read(dir.join(firmware_file(1))).unwrap(), vec![0xF0]);

    fs::remove_dir_all(&dir).unwrap();
}

// =============================================================================
// Early end
// =============================================================================

#[test]
fn test_input_ends_before_firmware_end() {
    let dir = scratch_dir("short");
    let sink = ImageSink::create(&dir, DEFAULT_MAX_IMAGE_SIZE).unwrap();
    let stop = AtomicBool::new(false);
    let records = &package()[..5];

    let (report, _sink) = session::run(Cursor::new(wire(records)), replay(), sink, &stop);

    assert!(!report.summary.completed);
    assert_eq!(report.summary.records, 5);
    assert_eq!(report.summary.applies, 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_stop_flag_ends_idle_session() {
    let stop = AtomicBool::new(false);

    let report = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::Relaxed);
        });
        let (report, _sink) = session::run(IdleLink, SessionConfig::default(), SlowSink::default(), &stop);
        report
    });

    assert!(!report.summary.completed);
    assert_eq!(report.summary.records, 0);
    assert_eq!(report.input.bytes, 0);
}

// =============================================================================
// Overflow
// =============================================================================

#[test]
fn test_live_link_drops_when_consumer_stalls() {
    const COUNT: usize = 300;
    let records: Vec<Record> = (0..COUNT)
        .map(|n| data(n as u16, &[n as u8], SegmentTag::Firmware))
        .collect();
    let stop = AtomicBool::new(false);

    let (report, sink) = session::run(
        Cursor::new(wire(&records)),
        SessionConfig::default(),
        SlowSink::default(),
        &stop,
    );

    assert!(report.input.dropped > 0);
    assert_eq!(report.input.records as usize, COUNT);
    assert_eq!(report.summary.records + report.input.dropped, COUNT as u32);
    assert_eq!(sink.writes, report.summary.records);
}

#[test]
fn test_replay_waits_instead_of_dropping() {
    const COUNT: usize = 300;
    let records: Vec<Record> = (0..COUNT)
        .map(|n| data(n as u16, &[n as u8], SegmentTag::Firmware))
        .collect();
    let stop = AtomicBool::new(false);

    let (report, sink) = session::run(Cursor::new(wire(&records)), replay(), SlowSink::default(), &stop);

    assert_eq!(report.input.dropped, 0);
    assert_eq!(sink.writes as usize, COUNT);
}

// =============================================================================
// Console
// =============================================================================

#[test]
fn test_console_reports_apply_results() {
    let dir = scratch_dir("console");
    let sink = ImageSink::create(&dir, DEFAULT_MAX_IMAGE_SIZE).unwrap();
    let stop = AtomicBool::new(false);
    let mut console = Vec::new();
    let records = vec![
        Record::end_of_file(SegmentTag::Bootloader),
        data(0, &[1], SegmentTag::Firmware),
        Record::end_of_file(SegmentTag::Firmware),
    ];

    let (report, sink) = session::run(
        Cursor::new(wire(&records)),
        replay(),
        ConsoleSink::new(sink, &mut console),
        &stop,
    );
    drop(sink);

    assert!(report.summary.completed);
    assert_eq!(report.summary.apply_failures, 1);
    let text = String::from_utf8(console).unwrap();
    assert_eq!(
        text,
        "DFU apply error: nothing written since the last apply\nDFU apply success\n"
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_modem_lifecycle_lines() {
    let mut modem = EmulatedModem::new(FirmwareId {
        version: "mfw_1.3.0".into(),
        uuid: "aaaa".into(),
    });
    modem.init(ModemMode::Normal).unwrap();
    let mut console = Vec::new();

    session::enter_dfu(&mut modem, &mut console).unwrap();
    assert_eq!(modem.mode(), Some(ModemMode::FullDfu));

    modem.stage(FirmwareId {
        version: "mfw_1.3.1".into(),
        uuid: "bbbb".into(),
    });
    session::leave_dfu(&mut modem, &mut console).unwrap();
    assert_eq!(modem.mode(), Some(ModemMode::Normal));

    assert_eq!(
        String::from_utf8(console).unwrap(),
        "Modem FW version: mfw_1.3.0\n\
         Modem FW UUID: aaaa\n\
         DFU start\n\
         Modem FW version: mfw_1.3.1\n\
         Modem FW UUID: bbbb\n"
    );
}
