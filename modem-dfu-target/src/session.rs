// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! One DFU session.
//!
//! A producer thread reads the link, decodes records and enqueues them; the
//! calling thread dequeues and dispatches them to the sink. The session ends
//! when the firmware segment has been applied, when the input ends or when
//! the stop flag is raised.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use modem_dfu_common::channel::RecordSender;
use modem_dfu_common::{
    ApplyError, DecoderConfig, Dispatcher, RecordChannel, RecordDecoder, SessionSummary,
    WriteError, WriteSink,
};

use crate::modem::{report_firmware, ModemControl, ModemMode};

const READ_CHUNK: usize = 256;

/// What the producer does when the channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Drop the new record. A live link cannot be paused.
    #[default]
    Drop,
    /// Wait for the consumer. Used when replaying a capture file.
    Wait,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub decoder: DecoderConfig,
    pub overflow: Overflow,
}

/// Producer side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    pub bytes: u64,
    pub records: u32,
    pub decode_errors: u32,
    pub dropped: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub summary: SessionSummary,
    pub input: InputStats,
}

/// Sink wrapper that reports write and apply results on the console.
pub struct ConsoleSink<'a, S> {
    inner: S,
    console: &'a mut dyn Write,
}

impl<'a, S: WriteSink> ConsoleSink<'a, S> {
    pub fn new(inner: S, console: &'a mut dyn Write) -> Self {
        Self { inner, console }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        if let Err(e) = self
            .console
            .write_fmt(args)
            .and_then(|_| self.console.write_all(b"\n"))
            .and_then(|_| self.console.flush())
        {
            log::warn!("Console write failed: {}", e);
        }
    }
}

impl<S: WriteSink> WriteSink for ConsoleSink<'_, S> {
    fn write_bootloader(&mut self, data: &[u8]) -> Result<(), WriteError> {
        let result = self.inner.write_bootloader(data);
        if let Err(e) = &result {
            self.line(format_args!("DFU bootloader write error: {}", e));
        }
        result
    }

    fn write_firmware(&mut self, address: u32, data: &[u8]) -> Result<(), WriteError> {
        let result = self.inner.write_firmware(address, data);
        if let Err(e) = &result {
            self.line(format_args!("DFU firmware write error: {}", e));
        }
        result
    }

    fn apply(&mut self) -> Result<(), ApplyError> {
        let result = self.inner.apply();
        match &result {
            Ok(()) => self.line(format_args!("DFU apply success")),
            Err(e) => self.line(format_args!("DFU apply error: {}", e)),
        }
        result
    }
}

fn stopped(stop: &AtomicBool, done: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed) || done.load(Ordering::Relaxed)
}

fn produce<R: Read>(
    mut input: R,
    config: SessionConfig,
    mut tx: RecordSender<'_>,
    stop: &AtomicBool,
    done: &AtomicBool,
) -> InputStats {
    let mut decoder = RecordDecoder::new(config.decoder);
    let mut buf = [0u8; READ_CHUNK];
    let mut bytes = 0u64;

    'read: while !stopped(stop, done) {
        let n = match input.read(&mut buf) {
            Ok(0) => {
                log::info!("Input closed after {} bytes", bytes);
                break;
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                log::error!("Input read error: {}", e);
                break;
            }
        };
        bytes += n as u64;

        for &byte in &buf[..n] {
            let Some(record) = decoder.feed(byte) else {
                continue;
            };

            if config.overflow == Overflow::Wait {
                while tx.is_full() {
                    if stopped(stop, done) {
                        break 'read;
                    }
                    thread::sleep(Duration::from_micros(200));
                }
            }

            if !tx.try_enqueue(record) {
                log::warn!("Record channel full, record dropped ({} total)", tx.dropped());
            }
        }
    }

    let stats = InputStats {
        bytes,
        records: decoder.records_decoded(),
        decode_errors: decoder.errors(),
        dropped: tx.dropped(),
    };
    tx.close();
    stats
}

/// Decode `input` on a producer thread and dispatch the records to `sink`.
pub fn run<R, S>(input: R, config: SessionConfig, sink: S, stop: &AtomicBool) -> (SessionReport, S)
where
    R: Read + Send,
    S: WriteSink,
{
    let mut channel = RecordChannel::new();
    let (tx, mut rx) = channel.split();
    let mut dispatcher = Dispatcher::new(sink);
    let done = AtomicBool::new(false);

    let (summary, input) = thread::scope(|s| {
        let producer = s.spawn(|| produce(input, config, tx, stop, &done));

        let summary = dispatcher.run(&mut rx);
        done.store(true, Ordering::Relaxed);
        // Unblock a producer waiting for space
        while rx.try_dequeue().is_some() {}

        let input = producer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (summary, input)
    });

    if input.decode_errors > 0 || input.dropped > 0 {
        log::warn!(
            "{} records rejected by the decoder, {} dropped on overflow",
            input.decode_errors,
            input.dropped
        );
    }

    (SessionReport { summary, input }, dispatcher.into_sink())
}

/// Bring the modem into full-DFU mode and announce it on the console.
pub fn enter_dfu<M: ModemControl + ?Sized>(modem: &mut M, console: &mut dyn Write) -> io::Result<()> {
    report_firmware(modem, console)?;

    if let Err(e) = modem.shutdown() {
        log::warn!("Modem shutdown: {}", e);
    }
    if let Err(e) = modem.init(ModemMode::FullDfu) {
        writeln!(console, "Modem init error: {}", e)?;
        return Err(io::Error::new(ErrorKind::Other, e));
    }

    writeln!(console, "DFU start")?;
    console.flush()
}

/// Return the modem to normal mode and report the firmware it now runs.
pub fn leave_dfu<M: ModemControl + ?Sized>(modem: &mut M, console: &mut dyn Write) -> io::Result<()> {
    if let Err(e) = modem.shutdown() {
        log::warn!("Modem shutdown: {}", e);
    }
    if let Err(e) = modem.init(ModemMode::Normal) {
        writeln!(console, "Modem init error: {}", e)?;
        return Err(io::Error::new(ErrorKind::Other, e));
    }

    report_firmware(modem, console)
}
